//! Bounded-wait calls
//!
//! Each call registers a transient route, then races the first matching
//! message against a timer. Whichever wins resolves the call exactly once:
//! the reply is sent through a oneshot channel the route handler can only
//! fire once, and the route is removed when the call's guard drops, on
//! success, timeout or cancellation alike.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::client::addressing::GET_SUBSCRIPTIONS;
use crate::client::messenger::Messenger;
use crate::protocol::{Address, NotifyReply, Status};
use crate::routing::{Handler, Inbound, RouteId};
use crate::utils::{Result, WireError};

/// How an action request is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionKind {
    /// `{base}/trigger/{receiver}/{action}`
    #[default]
    Trigger,
    /// `{base}/put/{receiver}/{action}`
    Put,
}

/// Removes a transient route when the pending call goes away.
struct TransientRoute<'a> {
    messenger: &'a Messenger,
    id: RouteId,
}

impl Drop for TransientRoute<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.messenger.remove_route(self.id) {
            error!("failed to remove transient route: {e}");
        }
    }
}

/// A handler that forwards the first matching payload and ignores the rest.
fn first_payload() -> (Handler, oneshot::Receiver<Value>) {
    let (tx, rx) = oneshot::channel();
    let slot = Mutex::new(Some(tx));
    let handler: Handler = Arc::new(move |inbound: &Inbound| {
        let tx = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(tx) = tx {
            let _ = tx.send(inbound.payload().clone());
        }
    });
    (handler, rx)
}

fn millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

impl Messenger {
    /// Current value of `participant`'s `key`.
    ///
    /// If this participant already subscribes to the topic, the last value
    /// it saw there answers at once. Otherwise the topic is subscribed and
    /// the first state message, usually the broker's retained copy, answers.
    /// If none arrives within `timeout` this resolves to an empty array, the
    /// same value a participant with an empty state would report.
    pub async fn get_state(&self, participant: &str, key: &str, timeout: Duration) -> Value {
        let topic = Address::state(participant, key).topic(self.base());
        let (handler, rx) = first_payload();

        let (id, cached) = match self.subscription_manager().add_state_query(&topic, handler) {
            Ok(query) => query,
            Err(e) => {
                warn!("cannot query {topic}: {e}");
                return Value::Array(Vec::new());
            }
        };
        let _route = TransientRoute {
            messenger: self,
            id,
        };
        if let Some(value) = cached {
            return value;
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => value,
            _ => {
                debug!("no state on {topic} within {}ms", millis(timeout));
                Value::Array(Vec::new())
            }
        }
    }

    /// `get_state` with the configured query timeout (`query.timeout_ms`).
    pub async fn get_state_default(&self, participant: &str, key: &str) -> Value {
        self.get_state(participant, key, self.query_timeout()).await
    }

    /// Ask `receiver` to perform `action` and wait for its notify reply.
    ///
    /// The request carries this participant's header so the receiver can
    /// answer on `{base}/{receiver}/notify/{self}/{action}`. A reply with a
    /// non-success status is an `ActionFailed` error; a reply with no status
    /// at all is accepted with a warning.
    pub async fn call_action(
        &self,
        receiver: &str,
        action: &str,
        value: Value,
        kind: ActionKind,
        timeout: Duration,
    ) -> Result<NotifyReply> {
        let reply_topic = Address::notify(receiver, self.name(), action).topic(self.base());
        let (handler, rx) = first_payload();
        let id = self
            .subscription_manager()
            .add_subscription(&reply_topic, handler)?;
        let _route = TransientRoute {
            messenger: self,
            id,
        };

        let request = match kind {
            ActionKind::Trigger => Address::trigger(receiver, action),
            ActionKind::Put => Address::put(receiver, action),
        };
        self.send(&request, value)?;

        let payload = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(payload)) => payload,
            _ => {
                return Err(WireError::Timeout {
                    topic: request.topic(self.base()),
                    timeout_ms: millis(timeout),
                });
            }
        };

        let reply = NotifyReply::from_value(&payload)?;
        match reply.status {
            Some(Status::Success) => Ok(reply),
            None => {
                warn!("{receiver} replied to {action} without a status");
                Ok(reply)
            }
            Some(Status::Failed) => Err(WireError::ActionFailed {
                receiver: receiver.to_string(),
                action: action.to_string(),
                response: reply.response,
            }),
        }
    }

    /// Patterns `receiver` is currently subscribed to, as it reports them.
    pub async fn get_subscriptions(&self, receiver: &str, timeout: Duration) -> Result<Vec<String>> {
        let reply = self
            .call_action(receiver, GET_SUBSCRIPTIONS, json!({}), ActionKind::Trigger, timeout)
            .await?;
        serde_json::from_value(reply.response)
            .map_err(|e| WireError::InvalidPayload(format!("subscription list: {e}")))
    }
}
