//! Message envelope
//!
//! `Envelope` is what a participant hands to the transport and what it gets
//! back for every inbound message. The payload is kept as a structured
//! `serde_json::Value` and only turned into text at the transport boundary.
//!
//! Notes on fields:
//! - `topic`: non-empty, built from the taxonomy in `topic`
//! - `payload`: any JSON value
//! - `qos`: delivery level passed through to the transport untouched
//! - `retain`: ask the broker to keep this as the topic's last value
//! - `duplicate`: redelivery marker, passed through untouched

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::{Result, WireError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Qos {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for Qos {
    type Error = WireError;

    fn try_from(level: u8) -> Result<Self> {
        match level {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(WireError::InvalidPayload(format!("qos {other} out of range"))),
        }
    }
}

impl From<Qos> for u8 {
    fn from(qos: Qos) -> u8 {
        match qos {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
            Qos::ExactlyOnce => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    pub payload: Value,
    pub qos: Qos,
    pub retain: bool,
    pub duplicate: bool,
}

impl Envelope {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            qos: Qos::default(),
            retain: false,
            duplicate: false,
        }
    }

    pub fn with_qos(mut self, qos: Qos) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn with_duplicate(mut self, duplicate: bool) -> Self {
        self.duplicate = duplicate;
        self
    }

    /// Serialize the payload to the text sent on the wire.
    pub fn encode_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.payload)?)
    }

    /// Build an envelope from raw bytes received from the transport.
    ///
    /// Returns `None` when the message must be dropped: a topic that is empty
    /// or not UTF-8, an empty payload, or a payload that is not JSON.
    pub fn decode(topic: &[u8], payload: &[u8]) -> Option<Envelope> {
        let topic = std::str::from_utf8(topic).ok()?;
        if topic.is_empty() || payload.is_empty() {
            return None;
        }
        let payload: Value = serde_json::from_slice(payload).ok()?;
        Some(Envelope::new(topic, payload))
    }
}
