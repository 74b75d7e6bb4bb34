//! MQTT transport
//!
//! Wraps a `rumqttc` client. Outbound calls go through the client's request
//! queue without awaiting; a background task polls the event loop, tracks
//! the connection state and forwards everything inbound as
//! `TransportEvent`s.
//!
//! Native participants connect over TCP on `port`. With `websocket` set the
//! connection is made as MQTT-over-WebSocket on `ws_port`, the endpoint
//! browser-hosted participants use.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::TransportSettings;
use crate::protocol::{Envelope, Qos};
use crate::transport::Transport;
use crate::transport::message::{RawMessage, TransportEvent};
use crate::utils::{Result, WireError};

/// rumqttc refuses keep-alive intervals below this.
const MIN_KEEP_ALIVE_SECS: u64 = 5;

#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl MqttTransport {
    /// Open a connection and spawn the task driving it.
    ///
    /// Must be called from within a tokio runtime. The connection is
    /// established in the background; a `TransportEvent::Connected` arrives
    /// on the returned receiver once the broker accepts it.
    pub fn connect(
        settings: &TransportSettings,
        client_id: &str,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let options = mqtt_options(settings, client_id);
        let (client, eventloop) = AsyncClient::new(options, settings.channel_capacity.max(1));
        let connected = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(drive(eventloop, tx, connected.clone()));

        (Self { client, connected }, rx)
    }

    /// Ask the broker to close the connection.
    pub async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| WireError::Transport(e.to_string()))
    }
}

impl Transport for MqttTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self, filter: &str, qos: Qos) -> Result<()> {
        self.client
            .try_subscribe(filter, to_rumqttc(qos))
            .map_err(|e| WireError::Transport(e.to_string()))
    }

    fn unsubscribe(&self, filter: &str) -> Result<()> {
        self.client
            .try_unsubscribe(filter)
            .map_err(|e| WireError::Transport(e.to_string()))
    }

    fn publish(&self, envelope: &Envelope) -> Result<()> {
        // rumqttc sets DUP itself on retransmission; the flag is not settable here.
        let payload = envelope.encode_payload()?;
        self.client
            .try_publish(
                envelope.topic.as_str(),
                to_rumqttc(envelope.qos),
                envelope.retain,
                payload,
            )
            .map_err(|e| WireError::Transport(e.to_string()))
    }
}

pub(super) fn mqtt_options(settings: &TransportSettings, client_id: &str) -> MqttOptions {
    let mut options = if settings.websocket {
        let url = format!("ws://{}:{}/mqtt", settings.host, settings.ws_port);
        let mut options = MqttOptions::new(client_id, url, settings.ws_port);
        options.set_transport(rumqttc::Transport::Ws);
        options
    } else {
        MqttOptions::new(client_id, settings.host.as_str(), settings.port)
    };
    options.set_keep_alive(Duration::from_secs(
        settings.keep_alive_secs.max(MIN_KEEP_ALIVE_SECS),
    ));
    options
}

/// Reconnection delay, doubling up to a cap.
pub(super) struct Backoff {
    current_ms: u64,
    max_ms: u64,
}

impl Backoff {
    pub(super) fn new() -> Self {
        Self {
            current_ms: 100,
            max_ms: 30_000,
        }
    }

    pub(super) fn next_delay(&mut self) -> Duration {
        let delay = self.current_ms;
        self.current_ms = (self.current_ms * 2).min(self.max_ms);
        Duration::from_millis(delay)
    }

    pub(super) fn reset(&mut self) {
        self.current_ms = 100;
    }
}

async fn drive(
    mut eventloop: EventLoop,
    tx: mpsc::UnboundedSender<TransportEvent>,
    connected: Arc<AtomicBool>,
) {
    let mut backoff = Backoff::new();

    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                if ack.code != rumqttc::ConnectReturnCode::Success {
                    warn!("connection refused: {:?}", ack.code);
                    continue;
                }
                info!("connected to broker");
                backoff.reset();
                connected.store(true, Ordering::SeqCst);
                TransportEvent::Connected {
                    session_present: ack.session_present,
                }
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                TransportEvent::Message(RawMessage {
                    topic: publish.topic.into_bytes(),
                    payload: publish.payload.to_vec(),
                    qos: from_rumqttc(publish.qos),
                    retain: publish.retain,
                    duplicate: publish.dup,
                })
            }
            Ok(Event::Incoming(Incoming::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                TransportEvent::Disconnected
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("disconnect requested, stopping event loop");
                connected.store(false, Ordering::SeqCst);
                let _ = tx.send(TransportEvent::Disconnected);
                return;
            }
            Ok(_) => continue,
            Err(err) => {
                let was_connected = connected.swap(false, Ordering::SeqCst);
                let delay = backoff.next_delay();
                if let ConnectionError::RequestsDone = err {
                    debug!("client handle dropped, stopping event loop");
                    let _ = tx.send(TransportEvent::Disconnected);
                    return;
                }
                warn!(
                    "connection error: {err}; reconnecting in {}ms",
                    delay.as_millis()
                );
                if was_connected && tx.send(TransportEvent::Disconnected).is_err() {
                    return;
                }
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        if tx.send(event).is_err() {
            debug!("transport events receiver dropped, stopping event loop");
            return;
        }
    }
}

pub(super) fn to_rumqttc(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
        Qos::ExactlyOnce => QoS::ExactlyOnce,
    }
}

pub(super) fn from_rumqttc(qos: QoS) -> Qos {
    match qos {
        QoS::AtMostOnce => Qos::AtMostOnce,
        QoS::AtLeastOnce => Qos::AtLeastOnce,
        QoS::ExactlyOnce => Qos::ExactlyOnce,
    }
}
