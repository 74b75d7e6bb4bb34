//! The `protocol` module holds the naming and encoding rules every
//! participant agrees on. Nothing in here keeps state.
//!
//! - `topic`: the message families and the topic grammar for each of them.
//! - `envelope`: the unit handed to and received from the transport.
//! - `header`: sender identity embedded inside payloads.
//! - `payload`: typed shapes for the families that have a fixed body.
//! - `identity`: participant names and compound client identifiers.

pub mod envelope;
pub mod header;
pub mod identity;
pub mod payload;
pub mod topic;

pub use envelope::{Envelope, Qos};
pub use header::{HEADER_KEY, Header};
pub use identity::{CompoundClientId, DELIMITER};
pub use payload::{ClientLifecycle, NotifyReply, Status};
pub use topic::{Address, Family};

#[cfg(test)]
mod tests;
