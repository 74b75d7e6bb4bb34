//! Typed payload shapes for families with a fixed body.
//!
//! State, put, trigger and signal payloads are free-form JSON. Notify
//! replies and broker lifecycle signals have a fixed shape and are checked
//! here before a handler sees them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::header::Header;
use crate::utils::{Result, WireError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    #[serde(other)]
    Failed,
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

/// Body of a notify-family reply: `{status, response, __head__}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default)]
    pub response: Value,
    #[serde(rename = "__head__", default, skip_serializing_if = "Option::is_none")]
    pub head: Option<Header>,
}

impl NotifyReply {
    pub fn new(status: Status, response: Value) -> Self {
        Self {
            status: Some(status),
            response,
            head: None,
        }
    }

    pub fn from_value(payload: &Value) -> Result<Self> {
        if !payload.is_object() {
            return Err(WireError::InvalidPayload(format!(
                "notify reply must be an object, got {payload}"
            )));
        }
        serde_json::from_value(payload.clone())
            .map_err(|e| WireError::InvalidPayload(format!("notify reply: {e}")))
    }
}

/// Body of the broker's `client-connected` / `client-disconnected` signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientLifecycle {
    #[serde(rename = "clientName")]
    pub client_name: String,
    #[serde(rename = "clientPath")]
    pub client_path: String,
}

impl ClientLifecycle {
    pub fn from_value(payload: &Value) -> Result<Self> {
        serde_json::from_value(payload.clone())
            .map_err(|e| WireError::InvalidPayload(format!("client lifecycle: {e}")))
    }
}

/// Flatten a failure response into a single-level array: nested arrays are
/// expanded depth-first, anything else becomes a one-element array.
pub fn flatten_deep(value: Value) -> Value {
    fn walk(value: Value, out: &mut Vec<Value>) {
        match value {
            Value::Array(items) => items.into_iter().for_each(|item| walk(item, out)),
            other => out.push(other),
        }
    }

    let mut out = Vec::new();
    walk(value, &mut out);
    Value::Array(out)
}
