//! Header-based response addressing
//!
//! A request carries its sender's `Header`; the handler that serves it
//! replies on the notify family to whoever that header names. Neither side
//! needs to know the other in advance.

use serde_json::{Value, json};
use tracing::{debug, error};

use crate::client::messenger::Messenger;
use crate::protocol::{Header, Status, payload::flatten_deep};
use crate::routing::RouteId;
use crate::utils::Result;

/// Trigger action answered by `serve_subscriptions`.
pub const GET_SUBSCRIPTIONS: &str = "get-subscriptions";

impl Messenger {
    /// Attach this participant's header to `value`, wrapping it as
    /// `{key: value}` first unless it already is an object.
    pub fn wrap_data(&self, key: &str, value: Value) -> Value {
        self.header().wrap(key, value)
    }

    /// Name of the participant that sent an inbound payload.
    pub fn get_receiver(payload: &Value) -> Option<String> {
        Header::sender_of(payload).map(str::to_string)
    }

    /// Whether an inbound payload was sent by this participant.
    pub fn same_sender(&self, payload: &Value) -> bool {
        Header::sender_of(payload) == Some(self.name())
    }

    /// Reply to the sender of `payload` on `endpoint` and hand `response`
    /// back to the caller.
    ///
    /// A non-success response is logged and flattened into an array first.
    /// When the payload names no sender nothing is published. The response
    /// is returned whether or not a reply went out.
    pub fn notify_sender(
        &self,
        payload: &Value,
        response: Value,
        endpoint: &str,
        status: Status,
    ) -> Value {
        let response = if status.is_success() {
            response
        } else {
            let flat = flatten_deep(response);
            error!("{endpoint} failed: {flat}");
            flat
        };

        let Some(receiver) = Self::get_receiver(payload) else {
            debug!("no receiver for {endpoint} reply");
            return response;
        };

        let body = json!({ "status": status, "response": response });
        if let Err(e) = self.send_notify(&receiver, endpoint, body) {
            error!("failed to notify {receiver} on {endpoint}: {e}");
        }
        response
    }

    /// Answer `get-subscriptions` triggers with the active pattern list.
    pub fn serve_subscriptions(&self) -> Result<RouteId> {
        let weak = self.downgrade();
        self.on_trigger(GET_SUBSCRIPTIONS, move |inbound| {
            let Some(messenger) = weak.upgrade() else {
                return;
            };
            let patterns = json!(messenger.subscriptions());
            messenger.notify_sender(inbound.payload(), patterns, GET_SUBSCRIPTIONS, Status::Success);
        })
    }
}
