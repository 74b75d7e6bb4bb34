//! The `routing` module turns route templates into transport subscriptions
//! and hands inbound messages to the handlers whose templates match.
//!
//! - `template`: parsing `{placeholder}` templates, deriving wildcard patterns
//!   and matching concrete topics.
//! - `router`: the route table and the active-pattern set.
//! - `manager`: `SubscriptionManager`, which couples the router with a
//!   transport connection.

pub mod manager;
pub mod router;
pub mod template;

pub use manager::SubscriptionManager;
pub use router::{Handler, Inbound, RouteId, Router};
pub use template::{Params, RouteTemplate};

#[cfg(test)]
mod tests;
