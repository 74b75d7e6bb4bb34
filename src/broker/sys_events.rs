//! Broker `$SYS` client notices
//!
//! Brokers that publish client lifecycle under `$SYS` (EMQX style:
//! `$SYS/brokers/{node}/clients/{clientid}/connected` with a JSON body
//! carrying `clientid`) can feed the `LifecycleBroadcaster` through this
//! source instead of an embedded broker hook.

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::debug;

use crate::broker::BrokerEvent;
use crate::client::Messenger;
use crate::utils::Result;

/// Filter covering every client notice on every broker node.
pub const SYS_CLIENTS_FILTER: &str = "$SYS/brokers/+/clients/#";

pub struct SysEventSource;

impl SysEventSource {
    /// Read one `$SYS` notice. The client id comes from the payload, since
    /// ids containing `/` cannot be recovered from the topic.
    pub fn parse(topic: &str, payload: &Value) -> Option<BrokerEvent> {
        if !topic.starts_with("$SYS/brokers/") {
            return None;
        }
        let client_id = payload.get("clientid")?.as_str()?.to_string();
        if topic.ends_with("/disconnected") {
            Some(BrokerEvent::ClientDisconnected { client_id })
        } else if topic.ends_with("/connected") {
            Some(BrokerEvent::ClientConnected { client_id })
        } else {
            None
        }
    }

    /// Subscribe `messenger` to client notices and forward them as
    /// `BrokerEvent`s.
    pub fn attach(messenger: &Messenger) -> Result<UnboundedReceiver<BrokerEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        messenger.add_subscription(SYS_CLIENTS_FILTER, move |inbound| {
            match Self::parse(inbound.topic(), inbound.payload()) {
                Some(event) => {
                    let _ = tx.send(event);
                }
                None => debug!("ignoring $SYS notice on {}", inbound.topic()),
            }
        })?;
        Ok(rx)
    }
}
