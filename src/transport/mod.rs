//! The `transport` module is the seam between participants and the broker.
//!
//! Participants only see the `Transport` trait for outbound operations and a
//! stream of `TransportEvent`s for inbound ones. Two implementations exist:
//!
//! - `mqtt`: a real broker connection over TCP or WebSocket (`rumqttc`).
//! - `memory`: an in-process broker, used by tests and single-process setups.

pub mod memory;
pub mod message;
pub mod mqtt;

pub use memory::{MemoryBroker, MemoryTransport};
pub use message::{RawMessage, TransportEvent};
pub use mqtt::MqttTransport;

use crate::protocol::{Envelope, Qos};
use crate::utils::Result;

/// Outbound operations on one broker connection.
///
/// Every method is non-blocking: it hands the request to the connection and
/// returns. Delivery guarantees are the transport's own.
pub trait Transport: Send + Sync {
    fn is_connected(&self) -> bool;

    fn subscribe(&self, filter: &str, qos: Qos) -> Result<()>;

    fn unsubscribe(&self, filter: &str) -> Result<()>;

    /// Publish with the envelope's qos, retain and duplicate flags unchanged.
    fn publish(&self, envelope: &Envelope) -> Result<()>;
}
