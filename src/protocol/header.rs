//! Sender identity embedded in payloads.
//!
//! Object payloads sent through the addressing-aware path carry a
//! `__head__` entry naming the participant that sent them. Replies are
//! addressed by reading it back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved payload key holding the `Header`.
pub const HEADER_KEY: &str = "__head__";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    #[serde(alias = "pluginName")]
    pub plugin_name: String,
    #[serde(alias = "pluginVersion", default)]
    pub plugin_version: String,
}

impl Header {
    pub fn new(plugin_name: impl Into<String>, plugin_version: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            plugin_version: plugin_version.into(),
        }
    }

    /// Read the full header out of an inbound payload.
    pub fn from_payload(payload: &Value) -> Option<Header> {
        serde_json::from_value(payload.get(HEADER_KEY)?.clone()).ok()
    }

    /// Name of the participant that sent `payload`, if it says so.
    pub fn sender_of(payload: &Value) -> Option<&str> {
        let head = payload.get(HEADER_KEY)?;
        head.get("plugin_name")
            .or_else(|| head.get("pluginName"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Attach this header to `value`.
    ///
    /// Objects get the header added in place; any other value is first
    /// wrapped as `{key: value}`.
    pub fn wrap(&self, key: &str, value: Value) -> Value {
        let mut msg = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert(key.to_string(), other);
                map
            }
        };
        // Header is plain strings; serialization cannot fail.
        msg.insert(
            HEADER_KEY.to_string(),
            serde_json::to_value(self).unwrap_or(Value::Null),
        );
        Value::Object(msg)
    }
}
