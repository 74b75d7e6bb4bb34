//! Subscription manager
//!
//! Couples a `Router` with the participant's transport connection:
//! registering a subscription records the route and, when connected,
//! subscribes its derived pattern exactly once. Inbound messages are decoded
//! here and handed to every matching handler.
//!
//! Concurrency note: the router sits behind a mutex that is released before
//! any handler runs, so handlers may register or remove routes themselves.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::protocol::{Address, Envelope, Family, Qos};
use crate::routing::router::{Handler, Inbound, RouteId, Router};
use crate::routing::template::RouteTemplate;
use crate::transport::{RawMessage, Transport};
use crate::utils::Result;

pub struct SubscriptionManager {
    base: String,
    transport: Arc<dyn Transport>,
    router: Mutex<Router>,
    qos: Qos,
}

impl SubscriptionManager {
    pub fn new(base: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            base: base.into(),
            transport,
            router: Mutex::new(Router::new()),
            qos: Qos::AtMostOnce,
        }
    }

    fn router(&self) -> MutexGuard<'_, Router> {
        self.router.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a route without touching the transport.
    pub fn add_route(&self, template: &str, handler: Handler) -> Result<RouteId> {
        let template = RouteTemplate::parse(template)?;
        Ok(self.router().add_route(template, handler))
    }

    /// Record a route and make sure its pattern is subscribed.
    ///
    /// While the transport is disconnected the route is recorded but nothing
    /// is subscribed; the pattern is only remembered as deferred. A pattern
    /// already in the active set is never subscribed twice.
    pub fn add_subscription(&self, template: &str, handler: Handler) -> Result<RouteId> {
        let template = RouteTemplate::parse(template)?;
        let pattern = template.pattern();

        let mut router = self.router();
        let id = router.add_route(template, handler);

        if !self.transport.is_connected() {
            warn!("cannot subscribe to {pattern}: not connected");
            router.defer(&pattern);
            return Ok(id);
        }
        if router.is_active(&pattern) {
            return Ok(id);
        }

        match self.transport.subscribe(&pattern, self.qos) {
            Ok(()) => {
                debug!("subscribed to {pattern}");
                router.mark_active(&pattern);
            }
            Err(e) => {
                error!("subscribe to {pattern} failed: {e}");
                router.defer(&pattern);
            }
        }
        Ok(id)
    }

    /// Register the transient route of a state query on `topic`.
    ///
    /// When an active pattern already covers the topic nothing is
    /// subscribed, so the broker replays nothing to other routes; the last
    /// value seen there is returned instead, if any. Otherwise the topic is
    /// subscribed as with `add_subscription`, and the broker's retained
    /// value only reaches routes on the new pattern.
    pub fn add_state_query(&self, topic: &str, handler: Handler) -> Result<(RouteId, Option<Value>)> {
        let template = RouteTemplate::parse(topic)?;
        let mut router = self.router();
        if router.covers(topic) {
            let cached = router.last_state(topic).cloned();
            let id = router.add_route(template, handler);
            return Ok((id, cached));
        }
        drop(router);
        Ok((self.add_subscription(topic, handler)?, None))
    }

    /// Drop a route, unsubscribing its pattern once nothing else uses it.
    pub fn remove_route(&self, id: RouteId) -> Result<()> {
        let unused = self.router().remove_route(id);
        if let Some(pattern) = unused {
            if self.transport.is_connected() {
                self.transport.unsubscribe(&pattern)?;
                debug!("unsubscribed from {pattern}");
            }
        }
        Ok(())
    }

    pub fn active_patterns(&self) -> Vec<String> {
        self.router().active_patterns().to_vec()
    }

    pub fn route_count(&self) -> usize {
        self.router().route_count()
    }

    /// Bring subscriptions in line after the transport (re)connects.
    ///
    /// Without a stored session the broker has forgotten every pattern, so
    /// the active set is subscribed again. Deferred patterns are only
    /// subscribed when `subscribe_deferred` is set.
    pub fn on_connected(&self, session_present: bool, subscribe_deferred: bool) {
        let mut router = self.router();

        if !session_present {
            for pattern in router.active_patterns() {
                if let Err(e) = self.transport.subscribe(pattern, self.qos) {
                    error!("resubscribe to {pattern} failed: {e}");
                }
            }
        }

        if subscribe_deferred {
            for pattern in router.take_deferred() {
                match self.transport.subscribe(&pattern, self.qos) {
                    Ok(()) => {
                        debug!("subscribed to deferred {pattern}");
                        router.mark_active(&pattern);
                    }
                    Err(e) => {
                        error!("subscribe to deferred {pattern} failed: {e}");
                        router.defer(&pattern);
                    }
                }
            }
        }
    }

    /// Decode a raw transport message and dispatch it. Malformed messages
    /// are dropped without running any handler.
    pub fn dispatch_raw(&self, raw: &RawMessage) -> usize {
        match raw.decode() {
            Some(envelope) => self.dispatch(envelope),
            None => {
                debug!(
                    "dropping malformed message on {}",
                    String::from_utf8_lossy(&raw.topic)
                );
                0
            }
        }
    }

    /// Run every handler whose template matches the envelope's topic.
    /// Returns how many ran.
    pub fn dispatch(&self, envelope: Envelope) -> usize {
        let address = Address::parse(&self.base, &envelope.topic);
        let handlers = {
            let mut router = self.router();
            if address.as_ref().is_some_and(|a| a.family() == Family::State) {
                router.record_state(&envelope);
            }
            router.matching(&envelope.topic)
        };
        if handlers.is_empty() {
            return 0;
        }

        let count = handlers.len();
        for (handler, params) in handlers {
            let inbound = Inbound {
                envelope: envelope.clone(),
                address: address.clone(),
                params,
            };
            handler(&inbound);
        }
        count
    }
}
