pub mod api;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderMap, HeaderValue, Method,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use relay_core::{
    identity::bearer_token, AllowedOrigins, AutomationClient, IdentityPolicy, Invocation,
    RelayConfig,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::ApiError;

// Application state: immutable, shared by every request
#[derive(Clone)]
pub struct AppState {
    automation: Arc<AutomationClient>,
    identity: Arc<IdentityPolicy>,
}

impl AppState {
    pub fn new(config: &RelayConfig) -> anyhow::Result<Self> {
        let automation =
            AutomationClient::new(config).context("Failed to initialize automation client")?;
        Ok(Self {
            automation: Arc::new(automation),
            identity: Arc::new(IdentityPolicy::from_secret(config.session_secret.as_ref())),
        })
    }
}

/// Builds the full router: routes, CORS and request tracing.
pub fn build_app(config: &RelayConfig) -> anyhow::Result<Router> {
    let state = AppState::new(config)?;
    let cors = cors_layer(&config.allowed_origins)?;
    Ok(router(state).layer(cors))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/trigger-tool", post(trigger_tool))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn cors_layer(origins: &AllowedOrigins) -> anyhow::Result<CorsLayer> {
    let allow_origin = match origins {
        AllowedOrigins::Any => AllowOrigin::any(),
        AllowedOrigins::List(list) => {
            let values = list
                .iter()
                .map(|o| {
                    HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin '{o}'"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            AllowOrigin::list(values)
        }
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]))
}

// --- HANDLERS ---

async fn health_check() -> &'static str {
    "Tool Relay: Operational"
}

async fn trigger_tool(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    // Raw bytes so malformed bodies get our 400 rather than the extractor's rejection.
    let invocation = Invocation::from_slice(&body)?;

    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);
    let invocation = state.identity.bind(invocation, bearer)?;

    info!(
        "User '{}' triggered tool '{}'",
        invocation.user_id, invocation.tool_id
    );

    let reply = state.automation.trigger(&invocation).await?;
    info!(
        "Tool '{}' completed with status {} ({} bytes)",
        invocation.tool_id,
        reply.status,
        reply.body.len()
    );

    let mut response = (reply.status, reply.body).into_response();
    match reply
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        Some(ct) => {
            response.headers_mut().insert(CONTENT_TYPE, ct);
        }
        None => {
            response.headers_mut().remove(CONTENT_TYPE);
        }
    }
    Ok(response)
}
