use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

/// Startup configuration problems. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Problems with the inbound invocation itself. No downstream call is made.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Request body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing or empty field: {0}")]
    MissingField(&'static str),
}

/// Caller identity could not be established or did not match.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid session token: {0}")]
    InvalidToken(String),

    #[error("Token subject does not match user_id '{claimed}'")]
    SubjectMismatch { claimed: String },
}

/// Failures talking to the automation endpoint.
#[derive(Debug, thiserror::Error)]
pub enum DownstreamError {
    #[error("Automation endpoint did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Automation endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Automation endpoint rejected the invocation with status {status}")]
    Rejected { status: StatusCode, body: Value },

    #[error("Relay failed while handling the downstream exchange: {0}")]
    Internal(String),
}

impl DownstreamError {
    /// Whether the caller may reasonably try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unreachable(_))
    }
}
