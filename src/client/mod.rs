//! The `client` module is the participant side of the bus.
//!
//! `Messenger` is the one capability a participant holds: it owns the
//! transport connection and subscription manager and offers the family
//! helpers, header-based replies and the bounded-wait calls on top of them.
//! Participant types keep a `Messenger` rather than re-implementing any of
//! this.

pub mod addressing;
pub mod messenger;
pub mod participant;
pub mod query;

pub use messenger::{Messenger, WeakMessenger};
pub use participant::Participant;
pub use query::ActionKind;
