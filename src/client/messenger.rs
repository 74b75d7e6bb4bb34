//! Messenger
//!
//! A cheaply clonable handle to one participant's connection. All clones
//! share the same transport, route table and connection state.
//!
//! Inbound traffic is processed by `run`, which must be driven (usually via
//! `spawn`) for handlers to fire. Everything else returns immediately.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::participant::Participant;
use crate::config::{QuerySettings, Settings};
use crate::protocol::{Address, Envelope, Family, Header, Qos};
use crate::routing::{Inbound, RouteId, SubscriptionManager};
use crate::transport::{MemoryBroker, MqttTransport, Transport, TransportEvent};
use crate::utils::Result;

struct Inner {
    participant: Participant,
    header: Header,
    client_id: String,
    transport: Arc<dyn Transport>,
    subscriptions: SubscriptionManager,
    connected: watch::Sender<bool>,
    subscribe_on_connect: AtomicBool,
    query_timeout_ms: AtomicU64,
}

#[derive(Clone)]
pub struct Messenger {
    inner: Arc<Inner>,
}

/// Non-owning handle, for handlers that need to reach their own messenger
/// without keeping it alive.
#[derive(Clone)]
pub struct WeakMessenger {
    inner: Weak<Inner>,
}

impl WeakMessenger {
    pub fn upgrade(&self) -> Option<Messenger> {
        self.inner.upgrade().map(|inner| Messenger { inner })
    }
}

impl Messenger {
    pub fn new(participant: Participant, client_id: String, transport: Arc<dyn Transport>) -> Self {
        let (connected, _) = watch::channel(false);
        let subscriptions = SubscriptionManager::new(participant.base.clone(), transport.clone());
        Self {
            inner: Arc::new(Inner {
                header: participant.header(),
                participant,
                client_id,
                transport,
                subscriptions,
                connected,
                subscribe_on_connect: AtomicBool::new(false),
                query_timeout_ms: AtomicU64::new(Settings::default().query.timeout_ms),
            }),
        }
    }

    /// Connect to the configured MQTT broker.
    pub fn connect(settings: &Settings) -> (Self, UnboundedReceiver<TransportEvent>) {
        let participant = Participant::from_settings(&settings.participant);
        let client_id = participant.client_id();
        let (transport, events) = MqttTransport::connect(&settings.transport, &client_id);
        let messenger = Self::new(participant, client_id, Arc::new(transport));
        messenger.set_subscribe_on_connect(settings.participant.subscribe_on_connect);
        messenger.set_query_settings(&settings.query);
        (messenger, events)
    }

    /// Connect to an in-process broker.
    pub fn connect_memory(
        broker: &MemoryBroker,
        participant: Participant,
    ) -> (Self, UnboundedReceiver<TransportEvent>) {
        let client_id = participant.client_id();
        let (transport, events) = broker.connect(&client_id);
        (Self::new(participant, client_id, Arc::new(transport)), events)
    }

    /// Subscribe patterns that were registered while disconnected as soon
    /// as the next connection comes up.
    pub fn set_subscribe_on_connect(&self, enabled: bool) {
        self.inner
            .subscribe_on_connect
            .store(enabled, Ordering::Relaxed);
    }

    pub fn set_query_settings(&self, settings: &QuerySettings) {
        self.inner
            .query_timeout_ms
            .store(settings.timeout_ms, Ordering::Relaxed);
    }

    /// Timeout used by `get_state_default`.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.inner.query_timeout_ms.load(Ordering::Relaxed))
    }

    pub fn downgrade(&self) -> WeakMessenger {
        WeakMessenger {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.participant.name
    }

    pub fn base(&self) -> &str {
        &self.inner.participant.base
    }

    pub fn participant(&self) -> &Participant {
        &self.inner.participant
    }

    pub fn header(&self) -> &Header {
        &self.inner.header
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    pub(crate) fn subscription_manager(&self) -> &SubscriptionManager {
        &self.inner.subscriptions
    }

    /// Process transport events until the connection goes away.
    ///
    /// Active patterns are only subscribed again on a `Connected` that
    /// follows a `Disconnected`. Anything subscribed before the first
    /// `Connected` was handled already went out on that same connection.
    pub async fn run(self, mut events: UnboundedReceiver<TransportEvent>) {
        let mut lost_connection = false;
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Connected { session_present } => {
                    info!("{} connected", self.name());
                    self.inner.subscriptions.on_connected(
                        session_present || !lost_connection,
                        self.inner.subscribe_on_connect.load(Ordering::Relaxed),
                    );
                    lost_connection = false;
                    self.inner.connected.send_replace(true);
                }
                TransportEvent::Disconnected => {
                    warn!("{} disconnected", self.name());
                    lost_connection = true;
                    self.inner.connected.send_replace(false);
                }
                TransportEvent::Message(raw) => {
                    let handled = self.inner.subscriptions.dispatch_raw(&raw);
                    debug!("dispatched to {handled} handler(s)");
                }
            }
        }
        self.inner.connected.send_replace(false);
        debug!("{} event stream closed", self.name());
    }

    pub fn spawn(&self, events: UnboundedReceiver<TransportEvent>) -> JoinHandle<()> {
        tokio::spawn(self.clone().run(events))
    }

    /// Wait until `run` has handled a `Connected` event. Returns `false` if
    /// `timeout` elapses first.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.connected.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|connected| *connected))
            .await
            .is_ok_and(|r| r.is_ok())
    }

    // -----------------------------------------------------------------------
    // Routes
    // -----------------------------------------------------------------------

    pub fn add_route<F>(&self, template: &str, handler: F) -> Result<RouteId>
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        self.inner.subscriptions.add_route(template, Arc::new(handler))
    }

    pub fn add_subscription<F>(&self, template: &str, handler: F) -> Result<RouteId>
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        self.inner
            .subscriptions
            .add_subscription(template, Arc::new(handler))
    }

    pub fn remove_route(&self, id: RouteId) -> Result<()> {
        self.inner.subscriptions.remove_route(id)
    }

    /// Patterns currently subscribed on the transport.
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.subscriptions.active_patterns()
    }

    fn on<F>(&self, address: Address, handler: F) -> Result<RouteId>
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        let template = address.topic(self.base());
        self.add_subscription(&template, handler)
    }

    /// State changes of `key` announced by `sender`. Either may be a
    /// `{placeholder}`.
    pub fn on_state<F>(&self, sender: &str, key: &str, handler: F) -> Result<RouteId>
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        self.on(Address::state(sender, key), handler)
    }

    pub fn on_state_error<F>(&self, sender: &str, key: &str, handler: F) -> Result<RouteId>
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        self.on(Address::error(sender, key), handler)
    }

    /// Requests from others to change this participant's `key`.
    pub fn on_put<F>(&self, key: &str, handler: F) -> Result<RouteId>
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        self.on(Address::put(self.name(), key), handler)
    }

    /// Notifications addressed to this participant by `sender`.
    pub fn on_notify<F>(&self, sender: &str, endpoint: &str, handler: F) -> Result<RouteId>
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        self.on(Address::notify(sender, self.name(), endpoint), handler)
    }

    pub fn on_status<F>(&self, sender: &str, handler: F) -> Result<RouteId>
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        self.on(Address::status(sender), handler)
    }

    /// Commands for this participant to perform `action`.
    pub fn on_trigger<F>(&self, action: &str, handler: F) -> Result<RouteId>
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        self.on(Address::trigger(self.name(), action), handler)
    }

    pub fn on_signal<F>(&self, sender: &str, topic: &str, handler: F) -> Result<RouteId>
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        self.on(Address::signal(sender, topic), handler)
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Publish `payload` as-is, without a header.
    pub fn send_message(&self, topic: &str, payload: Value, retain: bool, qos: Qos) -> Result<()> {
        let envelope = Envelope::new(topic, payload)
            .with_retain(retain)
            .with_qos(qos);
        self.publish(&envelope)
    }

    pub fn publish(&self, envelope: &Envelope) -> Result<()> {
        self.inner.transport.publish(envelope)?;
        debug!("published to {}", envelope.topic);
        Ok(())
    }

    /// Publish to `address` with the family's default retain policy.
    /// Directed families (put, trigger, notify) carry this participant's
    /// header so the receiver can reply; broadcasts go out unchanged.
    pub fn send(&self, address: &Address, value: Value) -> Result<()> {
        let family = address.family();
        let payload = match family {
            Family::Put | Family::Trigger | Family::Notify => self.wrap_data(address.key(), value),
            _ => value,
        };
        let envelope = Envelope::new(address.topic(self.base()), payload)
            .with_retain(family.retained_by_default());
        self.publish(&envelope)
    }

    pub fn send_state(&self, key: &str, value: Value) -> Result<()> {
        self.send(&Address::state(self.name(), key), value)
    }

    /// Announce that an attempt to change `key` failed.
    pub fn send_state_error(&self, key: &str, value: Value) -> Result<()> {
        self.send(&Address::error(self.name(), key), value)
    }

    pub fn send_put(&self, receiver: &str, key: &str, value: Value) -> Result<()> {
        self.send(&Address::put(receiver, key), value)
    }

    pub fn send_notify(&self, receiver: &str, endpoint: &str, value: Value) -> Result<()> {
        self.send(&Address::notify(self.name(), receiver, endpoint), value)
    }

    pub fn send_status(&self, value: Value) -> Result<()> {
        self.send(&Address::status(self.name()), value)
    }

    pub fn send_trigger(&self, receiver: &str, action: &str, value: Value) -> Result<()> {
        self.send(&Address::trigger(receiver, action), value)
    }

    pub fn send_signal(&self, topic: &str, value: Value) -> Result<()> {
        self.send(&Address::signal(self.name(), topic), value)
    }
}
