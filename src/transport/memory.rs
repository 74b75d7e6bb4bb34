//! In-process broker
//!
//! `MemoryBroker` routes messages between participants living in the same
//! process. It keeps:
//! - a map of connected clients, each with a channel for pushing
//!   `TransportEvent`s to it
//! - subscription filters with the set of clients subscribed to each
//! - the retained value per topic, replayed to new subscribers
//!
//! and reports connect/disconnect of every client to its observers as
//! `BrokerEvent`s, the same events a real broker exposes.
//!
//! Concurrency note: all state sits behind one mutex that is never held
//! across an await, so a `MemoryTransport` can be used from synchronous
//! handlers.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::broker::BrokerEvent;
use crate::protocol::{Envelope, Qos};
use crate::routing::RouteTemplate;
use crate::transport::Transport;
use crate::transport::message::{RawMessage, TransportEvent};
use crate::utils::{Result, WireError};

pub type ClientId = String;

/// Clients subscribed to one filter. Duplicate subscriptions are a no-op.
#[derive(Debug, Default)]
struct Subscription {
    subscribers: HashSet<ClientId>,
    subscribe_calls: usize,
}

#[derive(Debug)]
struct MemoryClient {
    sender: UnboundedSender<TransportEvent>,
}

#[derive(Debug, Default)]
struct BrokerState {
    clients: HashMap<ClientId, MemoryClient>,
    subscriptions: HashMap<String, Subscription>,
    retained: BTreeMap<String, Envelope>,
    observers: Vec<UnboundedSender<BrokerEvent>>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receive a `BrokerEvent` for every later connect and disconnect.
    pub fn observe(&self) -> UnboundedReceiver<BrokerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().observers.push(tx);
        rx
    }

    /// Connect a client. A client id already in use is taken over: the
    /// previous holder is disconnected first.
    pub fn connect(&self, client_id: &str) -> (MemoryTransport, UnboundedReceiver<TransportEvent>) {
        if self.lock().clients.contains_key(client_id) {
            self.disconnect(client_id);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(TransportEvent::Connected {
            session_present: false,
        });

        let mut state = self.lock();
        state
            .clients
            .insert(client_id.to_string(), MemoryClient { sender: tx });
        state.notify(BrokerEvent::ClientConnected {
            client_id: client_id.to_string(),
        });
        debug!("{client_id} connected");

        let transport = MemoryTransport {
            client_id: client_id.to_string(),
            broker: self.clone(),
        };
        (transport, rx)
    }

    /// Remove a client and all of its subscriptions.
    pub fn disconnect(&self, client_id: &str) {
        let mut state = self.lock();
        let Some(client) = state.clients.remove(client_id) else {
            return;
        };
        let _ = client.sender.send(TransportEvent::Disconnected);

        for subscription in state.subscriptions.values_mut() {
            subscription.subscribers.remove(client_id);
        }
        state.subscriptions.retain(|_, s| !s.subscribers.is_empty());
        state.notify(BrokerEvent::ClientDisconnected {
            client_id: client_id.to_string(),
        });
        debug!("{client_id} disconnected");
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.lock().clients.contains_key(client_id)
    }

    /// How many subscribe requests have been made for `filter` since it was
    /// last empty.
    pub fn subscribe_calls(&self, filter: &str) -> usize {
        self.lock()
            .subscriptions
            .get(filter)
            .map_or(0, |s| s.subscribe_calls)
    }

    pub fn subscriber_count(&self, filter: &str) -> usize {
        self.lock()
            .subscriptions
            .get(filter)
            .map_or(0, |s| s.subscribers.len())
    }

    pub fn retained(&self, topic: &str) -> Option<Envelope> {
        self.lock().retained.get(topic).cloned()
    }

    fn subscribe(&self, filter: &str, client_id: &str) -> Result<()> {
        let template = RouteTemplate::parse(filter)?;
        let mut state = self.lock();
        let Some(client) = state.clients.get(client_id) else {
            return Err(WireError::NotConnected);
        };
        let sender = client.sender.clone();

        // Retained values for matching topics go to the new subscriber only.
        for envelope in state.retained.values() {
            if filter_matches(&template, &envelope.topic) {
                if let Some(raw) = to_raw(envelope, true) {
                    let _ = sender.send(TransportEvent::Message(raw));
                }
            }
        }

        let subscription = state.subscriptions.entry(filter.to_string()).or_default();
        subscription.subscribe_calls += 1;
        subscription.subscribers.insert(client_id.to_string());
        Ok(())
    }

    fn unsubscribe(&self, filter: &str, client_id: &str) {
        let mut state = self.lock();
        if let Some(subscription) = state.subscriptions.get_mut(filter) {
            subscription.subscribers.remove(client_id);
            if subscription.subscribers.is_empty() {
                state.subscriptions.remove(filter);
            }
        }
    }

    fn publish(&self, envelope: &Envelope) -> Result<()> {
        let payload = envelope.encode_payload()?;
        let mut state = self.lock();

        if envelope.retain {
            if envelope.payload.is_null() {
                state.retained.remove(&envelope.topic);
            } else {
                state
                    .retained
                    .insert(envelope.topic.clone(), envelope.clone());
            }
        }

        let mut recipients: HashSet<&ClientId> = HashSet::new();
        for (filter, subscription) in &state.subscriptions {
            let Ok(template) = RouteTemplate::parse(filter) else {
                continue;
            };
            if filter_matches(&template, &envelope.topic) {
                recipients.extend(subscription.subscribers.iter());
            }
        }

        let raw = RawMessage {
            topic: envelope.topic.clone().into_bytes(),
            payload,
            qos: envelope.qos,
            retain: false,
            duplicate: envelope.duplicate,
        };
        for client_id in recipients {
            match state.clients.get(client_id) {
                Some(client) => {
                    if let Err(e) = client.sender.send(TransportEvent::Message(raw.clone())) {
                        warn!("failed to deliver to {client_id}: {e}");
                    }
                }
                None => warn!("no client registered with id: {client_id}"),
            }
        }
        Ok(())
    }
}

impl BrokerState {
    fn notify(&mut self, event: BrokerEvent) {
        self.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn filter_matches(template: &RouteTemplate, topic: &str) -> bool {
    template.matches(topic).is_some()
}

fn to_raw(envelope: &Envelope, retain: bool) -> Option<RawMessage> {
    let payload = envelope.encode_payload().ok()?;
    Some(RawMessage {
        topic: envelope.topic.clone().into_bytes(),
        payload,
        qos: envelope.qos,
        retain,
        duplicate: false,
    })
}

/// One participant's connection to a `MemoryBroker`.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    client_id: String,
    broker: MemoryBroker,
}

impl MemoryTransport {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn disconnect(&self) {
        self.broker.disconnect(&self.client_id);
    }
}

impl Transport for MemoryTransport {
    fn is_connected(&self) -> bool {
        self.broker.is_connected(&self.client_id)
    }

    fn subscribe(&self, filter: &str, _qos: Qos) -> Result<()> {
        self.broker.subscribe(filter, &self.client_id)
    }

    fn unsubscribe(&self, filter: &str) -> Result<()> {
        self.broker.unsubscribe(filter, &self.client_id);
        Ok(())
    }

    fn publish(&self, envelope: &Envelope) -> Result<()> {
        if !self.is_connected() {
            return Err(WireError::NotConnected);
        }
        self.broker.publish(envelope)
    }
}
