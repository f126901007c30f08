use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect, Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::error::{ConfigError, DownstreamError};
use crate::invocation::Invocation;

/// A successful downstream answer, forwarded as-is.
#[derive(Debug, Clone)]
pub struct DownstreamReply {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Client for the workflow-automation webhook. Cheap to clone; the
/// underlying connection pool is shared.
#[derive(Clone)]
pub struct AutomationClient {
    client: Client,
    endpoint: Url,
    api_key: SecretString,
    timeout: Duration,
}

impl AutomationClient {
    pub fn new(config: &RelayConfig) -> Result<Self, ConfigError> {
        // Never follow redirects: one invocation is exactly one outbound call.
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.webhook_url.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    /// Sends one invocation downstream. Single attempt, bounded by the timeout.
    pub async fn trigger(&self, invocation: &Invocation) -> Result<DownstreamReply, DownstreamError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.expose_secret())
            .json(&invocation.outbound())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| self.classify(e))?.to_vec();

        if !status.is_success() {
            warn!(
                "Automation endpoint rejected tool '{}' with status {}",
                invocation.tool_id, status
            );
            return Err(DownstreamError::Rejected {
                status,
                body: rejection_body(&body),
            });
        }

        debug!("Automation endpoint answered {} ({} bytes)", status, body.len());
        Ok(DownstreamReply {
            status,
            content_type,
            body,
        })
    }

    fn classify(&self, err: reqwest::Error) -> DownstreamError {
        if err.is_timeout() {
            DownstreamError::Timeout(self.timeout)
        } else if err.is_builder() {
            DownstreamError::Internal(err.to_string())
        } else {
            // Connect, request and body-read failures are all transport problems.
            DownstreamError::Unreachable(err.to_string())
        }
    }
}

/// JSON when the rejection body parses, otherwise the raw text.
fn rejection_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::State,
        http::{header::LOCATION, HeaderMap, StatusCode as AxumStatus},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Seen = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn record(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (AxumStatus, Json<Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let status = match body["tool"].as_str() {
            Some("forbidden-tool") => AxumStatus::FORBIDDEN,
            _ => AxumStatus::OK,
        };
        seen.lock().unwrap().push((auth, body));
        (status, Json(json!({"result": "ok"})))
    }

    async fn spawn_downstream() -> (Url, Seen) {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/hook", post(record))
            .with_state(seen.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (Url::parse(&format!("http://{addr}/hook")).unwrap(), seen)
    }

    fn client_for(endpoint: Url) -> AutomationClient {
        let config = RelayConfig::from_lookup(|key| match key {
            "AUTOMATION_WEBHOOK_URL" => Some(endpoint.to_string()),
            "AUTOMATION_API_KEY" => Some("secret-key".to_string()),
            "AUTOMATION_TIMEOUT_SECS" => Some("5".to_string()),
            _ => None,
        })
        .unwrap();
        AutomationClient::new(&config).unwrap()
    }

    fn invocation(tool: &str) -> Invocation {
        Invocation {
            user_id: "user-7".to_string(),
            tool_id: tool.to_string(),
            input: json!({"text": "hello"}),
        }
    }

    #[tokio::test]
    async fn sends_bearer_and_renamed_body() {
        let (endpoint, seen) = spawn_downstream().await;
        let reply = client_for(endpoint)
            .trigger(&invocation("summarizer"))
            .await
            .unwrap();

        assert_eq!(reply.status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(body, json!({"result": "ok"}));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some("Bearer secret-key"));
        assert_eq!(
            seen[0].1,
            json!({"user": "user-7", "tool": "summarizer", "input": {"text": "hello"}})
        );
    }

    #[tokio::test]
    async fn non_success_status_is_rejected_with_body() {
        let (endpoint, _) = spawn_downstream().await;
        let err = client_for(endpoint)
            .trigger(&invocation("forbidden-tool"))
            .await
            .unwrap_err();

        match err {
            DownstreamError::Rejected { status, body } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(body, json!({"result": "ok"}));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn redirect_is_not_followed() {
        let hits: Arc<AtomicUsize> = Arc::default();
        let app = Router::new()
            .route(
                "/hook",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (AxumStatus::FOUND, [(LOCATION, "/landing")])
                }),
            )
            .route(
                "/landing",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    "landed"
                }),
            )
            .with_state(hits.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let endpoint = Url::parse(&format!("http://{addr}/hook")).unwrap();
        let err = client_for(endpoint)
            .trigger(&invocation("summarizer"))
            .await
            .unwrap_err();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        match err {
            DownstreamError::Rejected { status, .. } => assert_eq!(status, StatusCode::FOUND),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_port_is_unreachable_and_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Url::parse(&format!("http://{addr}/hook")).unwrap();
        let err = client_for(endpoint)
            .trigger(&invocation("summarizer"))
            .await
            .unwrap_err();

        assert!(matches!(err, DownstreamError::Unreachable(_)), "{err:?}");
        assert!(err.is_retryable());
    }

    #[test]
    fn rejection_body_falls_back_to_text() {
        assert_eq!(rejection_body(b""), Value::Null);
        assert_eq!(rejection_body(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(rejection_body(b"nope"), json!("nope"));
    }
}
