use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RequestError;

// What the dashboard sends us
#[derive(Debug, Clone, Deserialize)]
pub struct InvocationRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub tool_id: Option<String>,
    #[serde(default)]
    pub input: Value, // Absent means null
}

/// A request that passed shape validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub user_id: String,
    pub tool_id: String,
    pub input: Value,
}

impl Invocation {
    /// Parses and validates a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, RequestError> {
        let request: InvocationRequest =
            serde_json::from_slice(body).map_err(|e| RequestError::InvalidJson(e.to_string()))?;
        request.validate()
    }

    /// The body sent to the automation endpoint.
    pub fn outbound(&self) -> OutboundPayload<'_> {
        OutboundPayload {
            user: &self.user_id,
            tool: &self.tool_id,
            input: &self.input,
        }
    }
}

impl InvocationRequest {
    pub fn validate(self) -> Result<Invocation, RequestError> {
        let user_id = non_empty(self.user_id).ok_or(RequestError::MissingField("user_id"))?;
        let tool_id = non_empty(self.tool_id).ok_or(RequestError::MissingField("tool_id"))?;
        Ok(Invocation {
            user_id,
            tool_id,
            input: self.input,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// What the automation engine receives
#[derive(Debug, Serialize)]
pub struct OutboundPayload<'a> {
    pub user: &'a str,
    pub tool: &'a str,
    pub input: &'a Value,
}
