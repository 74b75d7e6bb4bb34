//! The `error` module defines the error type used across `plugwire`.
//!
//! Most protocol failures travel as messages (error-family topics, empty
//! query results). `WireError` only covers failures local to a participant.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("payload encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport rejected request: {0}")]
    Transport(String),

    #[error("transport is not connected")]
    NotConnected,

    #[error("no reply on {topic} within {timeout_ms}ms")]
    Timeout { topic: String, timeout_ms: u64 },

    #[error("{receiver} failed {action}: {response}")]
    ActionFailed {
        receiver: String,
        action: String,
        response: Value,
    },

    #[error("invalid route template '{0}'")]
    InvalidTemplate(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, WireError>;
