use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_core::{DownstreamError, IdentityError, RequestError};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

// Output: what the caller gets back when an invocation fails
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downstream_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downstream_body: Option<Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Downstream(#[from] DownstreamError),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Request(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Identity(IdentityError::SubjectMismatch { .. }) => {
                (StatusCode::FORBIDDEN, "forbidden")
            }
            ApiError::Identity(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Downstream(DownstreamError::Timeout(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, "downstream_timeout")
            }
            ApiError::Downstream(DownstreamError::Unreachable(_)) => {
                (StatusCode::BAD_GATEWAY, "downstream_unreachable")
            }
            // Error statuses pass through; an unfollowed redirect would be
            // mangled by the client, so it becomes 502.
            ApiError::Downstream(DownstreamError::Rejected { status, .. }) => (
                if status.is_client_error() || status.is_server_error() {
                    *status
                } else {
                    StatusCode::BAD_GATEWAY
                },
                "downstream_rejected",
            ),
            ApiError::Downstream(DownstreamError::Internal(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!("Invocation failed ({}): {}", code, self);
        } else {
            warn!("Invocation refused ({}): {}", code, self);
        }

        let (retryable, downstream_status, downstream_body) = match &self {
            ApiError::Downstream(DownstreamError::Rejected { status, body }) => {
                (false, Some(status.as_u16()), Some(body.clone()))
            }
            ApiError::Downstream(e) => (e.is_retryable(), None, None),
            _ => (false, None, None),
        };

        let body = ErrorEnvelope {
            ok: false,
            error: ErrorBody {
                code,
                message: self.to_string(),
                retryable,
                downstream_status,
                downstream_body,
            },
        };

        (status, Json(body)).into_response()
    }
}
