use crate::protocol::{Envelope, Qos};

/// A message exactly as the transport delivered it.
///
/// The topic stays raw bytes until decoding so that a topic which is not
/// valid text can be recognised and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: Vec<u8>,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub retain: bool,
    pub duplicate: bool,
}

impl RawMessage {
    pub fn new(topic: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: Qos::AtMostOnce,
            retain: false,
            duplicate: false,
        }
    }

    /// Decode into an `Envelope`, or `None` if the message must be dropped.
    pub fn decode(&self) -> Option<Envelope> {
        Envelope::decode(&self.topic, &self.payload).map(|envelope| {
            envelope
                .with_qos(self.qos)
                .with_retain(self.retain)
                .with_duplicate(self.duplicate)
        })
    }
}

/// Everything a participant hears from its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected { session_present: bool },
    Disconnected,
    Message(RawMessage),
}
