use std::net::SocketAddr;
use std::time::Duration;

use reqwest::Url;
use secrecy::SecretString;

use crate::error::ConfigError;

pub const ENV_WEBHOOK_URL: &str = "AUTOMATION_WEBHOOK_URL";
pub const ENV_API_KEY: &str = "AUTOMATION_API_KEY";
pub const ENV_TIMEOUT_SECS: &str = "AUTOMATION_TIMEOUT_SECS";
pub const ENV_ALLOWED_ORIGINS: &str = "CORS_ALLOWED_ORIGINS";
pub const ENV_BIND_ADDR: &str = "RELAY_BIND_ADDR";
pub const ENV_SESSION_SECRET: &str = "SESSION_JWT_SECRET";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Which origins may call the relay from a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    fn parse(raw: Option<&str>) -> Self {
        let origins: Vec<String> = raw
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if origins.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        }
    }
}

/// Everything the relay needs, read once at startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub webhook_url: Url,
    pub api_key: SecretString,
    pub timeout: Duration,
    pub allowed_origins: AllowedOrigins,
    pub bind_addr: SocketAddr,
    /// HS256 secret for caller session tokens. `None` means callers are trusted.
    pub session_secret: Option<SecretString>,
}

impl RelayConfig {
    /// Reads the process environment. Callers load `.env` beforehand if they want it.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let raw_url = get(ENV_WEBHOOK_URL)
            .ok_or_else(|| ConfigError::MissingEnvVar(ENV_WEBHOOK_URL.to_string()))?;
        let webhook_url = Url::parse(raw_url.trim()).map_err(|e| ConfigError::InvalidValue {
            key: ENV_WEBHOOK_URL.to_string(),
            message: e.to_string(),
        })?;
        if !matches!(webhook_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: ENV_WEBHOOK_URL.to_string(),
                message: format!("unsupported scheme '{}'", webhook_url.scheme()),
            });
        }

        let api_key = get(ENV_API_KEY)
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar(ENV_API_KEY.to_string()))?;

        let timeout_secs = match get(ENV_TIMEOUT_SECS) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_TIMEOUT_SECS.to_string(),
                        message: "must be greater than zero".to_string(),
                    })
                }
                Ok(secs) => secs,
                Err(e) => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_TIMEOUT_SECS.to_string(),
                        message: e.to_string(),
                    })
                }
            },
            None => DEFAULT_TIMEOUT_SECS,
        };

        let bind_addr = get(ENV_BIND_ADDR)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: ENV_BIND_ADDR.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            webhook_url,
            api_key,
            timeout: Duration::from_secs(timeout_secs),
            allowed_origins: AllowedOrigins::parse(get(ENV_ALLOWED_ORIGINS).as_deref()),
            bind_addr,
            session_secret: get(ENV_SESSION_SECRET).map(SecretString::from),
        })
    }
}
