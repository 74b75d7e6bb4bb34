//! Route table
//!
//! `Router` is plain bookkeeping: which handlers are registered against which
//! templates, and which derived patterns are currently subscribed on the
//! transport. It performs no I/O; `SubscriptionManager` drives it.
//!
//! The active-pattern set holds each pattern at most once, in the order it
//! was first subscribed. Several routes may share one pattern.
//!
//! The router also keeps the last state-family value seen on every topic an
//! active pattern covers, so a state query over an existing subscription can
//! be answered without subscribing again.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::protocol::{Address, Envelope, Header};
use crate::routing::template::{Params, RouteTemplate};

/// Callback run for every inbound message matching its route.
pub type Handler = Arc<dyn Fn(&Inbound) + Send + Sync>;

/// A decoded inbound message as seen by a handler.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub envelope: Envelope,
    /// Family classification, when the topic follows the taxonomy.
    pub address: Option<Address>,
    /// Concrete values captured for the route's placeholders.
    pub params: Params,
}

impl Inbound {
    pub fn topic(&self) -> &str {
        &self.envelope.topic
    }

    pub fn payload(&self) -> &Value {
        &self.envelope.payload
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Participant named in the payload header.
    pub fn sender(&self) -> Option<&str> {
        Header::sender_of(&self.envelope.payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(u64);

struct RouteEntry {
    id: RouteId,
    template: RouteTemplate,
    pattern: String,
    handler: Handler,
}

#[derive(Default)]
pub struct Router {
    routes: Vec<RouteEntry>,
    active: Vec<String>,
    deferred: Vec<String>,
    last_state: BTreeMap<String, Value>,
    next_id: u64,
}

fn covered(active: &[String], topic: &str) -> bool {
    active.iter().any(|pattern| {
        RouteTemplate::parse(pattern).is_ok_and(|template| template.matches(topic).is_some())
    })
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a (template, handler) pair. Always succeeds.
    pub fn add_route(&mut self, template: RouteTemplate, handler: Handler) -> RouteId {
        let id = RouteId(self.next_id);
        self.next_id += 1;
        let pattern = template.pattern();
        self.routes.push(RouteEntry {
            id,
            template,
            pattern,
            handler,
        });
        id
    }

    /// Drop a route. Returns its pattern when no remaining route uses it,
    /// after removing that pattern from the active and deferred sets.
    pub fn remove_route(&mut self, id: RouteId) -> Option<String> {
        let index = self.routes.iter().position(|r| r.id == id)?;
        let entry = self.routes.remove(index);
        if self.routes.iter().any(|r| r.pattern == entry.pattern) {
            return None;
        }
        self.deferred.retain(|p| *p != entry.pattern);
        let was_active = self.active.iter().any(|p| *p == entry.pattern);
        self.active.retain(|p| *p != entry.pattern);
        let active = &self.active;
        self.last_state.retain(|topic, _| covered(active, topic));
        was_active.then_some(entry.pattern)
    }

    pub fn is_active(&self, pattern: &str) -> bool {
        self.active.iter().any(|p| p == pattern)
    }

    /// Add `pattern` to the active set. Returns `false` if it was already there.
    pub fn mark_active(&mut self, pattern: &str) -> bool {
        if self.is_active(pattern) {
            return false;
        }
        self.deferred.retain(|p| p != pattern);
        self.active.push(pattern.to_string());
        true
    }

    pub fn active_patterns(&self) -> &[String] {
        &self.active
    }

    /// Whether some active pattern already delivers `topic`.
    pub fn covers(&self, topic: &str) -> bool {
        covered(&self.active, topic)
    }

    /// Remember a state value delivered on a covered topic. A `null` payload
    /// forgets the topic.
    pub fn record_state(&mut self, envelope: &Envelope) {
        if envelope.payload.is_null() {
            self.last_state.remove(&envelope.topic);
        } else if self.covers(&envelope.topic) {
            self.last_state
                .insert(envelope.topic.clone(), envelope.payload.clone());
        }
    }

    pub fn last_state(&self, topic: &str) -> Option<&Value> {
        self.last_state.get(topic)
    }

    /// Remember a pattern that could not be subscribed yet.
    pub fn defer(&mut self, pattern: &str) {
        if !self.is_active(pattern) && !self.deferred.iter().any(|p| p == pattern) {
            self.deferred.push(pattern.to_string());
        }
    }

    pub fn take_deferred(&mut self) -> Vec<String> {
        std::mem::take(&mut self.deferred)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Every handler whose template matches `topic`, with its captures.
    ///
    /// Handlers are cloned out so callers can run them without holding
    /// whatever lock guards the router.
    pub fn matching(&self, topic: &str) -> Vec<(Handler, Params)> {
        self.routes
            .iter()
            .filter_map(|route| {
                route
                    .template
                    .matches(topic)
                    .map(|params| (route.handler.clone(), params))
            })
            .collect()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.len())
            .field("active", &self.active)
            .field("deferred", &self.deferred)
            .field("last_state", &self.last_state.len())
            .finish()
    }
}
