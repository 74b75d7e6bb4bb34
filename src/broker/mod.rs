//! Broker-side lifecycle handling.
//!
//! The broker itself is external. This module observes its client
//! connect/disconnect events and republishes them as signal-family messages
//! that every participant can subscribe to.
//!
//! - `signals`: `LifecycleBroadcaster`, turning `BrokerEvent`s into signals.
//! - `sys_events`: reads broker `$SYS` client notices into `BrokerEvent`s.
//! - `registry`: `PluginRegistry`, the participant-side view of those signals.

pub mod registry;
pub mod signals;
pub mod sys_events;

pub use registry::PluginRegistry;
pub use signals::LifecycleBroadcaster;
pub use sys_events::SysEventSource;

/// Raw connection events reported by a broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    ClientConnected { client_id: String },
    ClientDisconnected { client_id: String },
}

/// Sender name used for every message the broker side publishes.
pub const BROKER_NAME: &str = "broker";
pub const CLIENT_CONNECTED: &str = "client-connected";
pub const CLIENT_DISCONNECTED: &str = "client-disconnected";
