//! Connection lifecycle signals
//!
//! Each connection goes `Connected -> Disconnected`; the broker owns that
//! transition, the broadcaster only observes it. For a client whose id
//! carries a path (`name>>path`) it publishes
//! `{base}/broker/signal/client-connected` or
//! `{base}/broker/signal/client-disconnected` with
//! `{clientName, clientPath}`. Bare-name clients are ignored.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info};

use crate::broker::{BROKER_NAME, BrokerEvent, CLIENT_CONNECTED, CLIENT_DISCONNECTED};
use crate::protocol::{Address, ClientLifecycle, CompoundClientId, Envelope};
use crate::transport::Transport;
use crate::utils::Result;

pub struct LifecycleBroadcaster {
    base: String,
    transport: Arc<dyn Transport>,
}

impl LifecycleBroadcaster {
    pub fn new(base: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            base: base.into(),
            transport,
        }
    }

    /// The signal to publish for `event`, if any.
    pub fn signal_for(&self, event: &BrokerEvent) -> Option<Envelope> {
        let (client_id, endpoint) = match event {
            BrokerEvent::ClientConnected { client_id } => (client_id, CLIENT_CONNECTED),
            BrokerEvent::ClientDisconnected { client_id } => (client_id, CLIENT_DISCONNECTED),
        };

        let id = CompoundClientId::parse(client_id);
        let client_path = id.path?;
        let body = ClientLifecycle {
            client_name: id.name,
            client_path,
        };
        let payload = serde_json::to_value(body).ok()?;
        let topic = Address::signal(BROKER_NAME, endpoint).topic(&self.base);
        Some(Envelope::new(topic, payload))
    }

    /// Publish the signal for one event. Returns whether one was published.
    pub fn handle(&self, event: &BrokerEvent) -> Result<bool> {
        let Some(envelope) = self.signal_for(event) else {
            debug!("ignoring lifecycle event without path: {event:?}");
            return Ok(false);
        };
        self.transport.publish(&envelope)?;
        info!("{}: {}", envelope.topic, envelope.payload);
        Ok(true)
    }

    /// Consume events until the source closes.
    pub async fn run(self, mut events: UnboundedReceiver<BrokerEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle(&event) {
                error!("failed to publish lifecycle signal for {event:?}: {e}");
            }
        }
        debug!("lifecycle event source closed");
    }
}
