//! # plugwire
//!
//! `plugwire` is the message-routing layer that lets independent plugin
//! processes cooperate over a shared MQTT broker. Every message belongs to a
//! topic family (state, error, put, notify, status, trigger, signal);
//! participants subscribe with parameterized route templates, reply to
//! whoever asked by reading a header carried in the request, and can make
//! bounded-wait calls that look synchronous.
//!
//! ## Core Modules
//!
//! - `protocol`: the topic taxonomy, message envelope, header and payload shapes.
//! - `routing`: route templates and the subscription manager.
//! - `client`: `Messenger`, a participant's handle on the bus, with the
//!   addressing helpers and bounded-wait calls.
//! - `broker`: broker-side lifecycle signals and the plugin registry.
//! - `transport`: the MQTT connection and an in-process broker.
//! - `config`: loading settings from files and the environment.
//! - `utils`: the error type and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod protocol;
pub mod routing;
pub mod transport;
pub mod utils;

pub use client::{ActionKind, Messenger, Participant};
pub use utils::{Result, WireError};

#[cfg(test)]
mod tests;
