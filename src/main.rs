//! CLI for plugwire
//!
//! Subcommands:
//! - `watch`: print every message matching one or more route templates
//! - `publish`: publish a raw JSON payload
//! - `get-state`: ask for a participant's current value of a key
//! - `trigger`: call an action on a participant and print its reply
//! - `subscriptions`: ask a participant which patterns it is subscribed to
//! - `lifecycle`: run the broker lifecycle broadcaster from `$SYS` notices

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use plugwire::broker::{LifecycleBroadcaster, SysEventSource};
use plugwire::config::{Settings, load_config};
use plugwire::protocol::Qos;
use plugwire::transport::MqttTransport;
use plugwire::{ActionKind, Messenger, Participant, Result, WireError};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{error, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "plugwire")]
enum Command {
    /// Print messages matching the given templates until interrupted
    Watch {
        /// Route templates, e.g. `microdrop/{sender}/state/#`
        #[arg(required = true)]
        templates: Vec<String>,
    },
    /// Publish a JSON payload as-is
    Publish {
        topic: String,
        payload: String,
        #[arg(long)]
        retain: bool,
        #[arg(long, default_value_t = 0)]
        qos: u8,
    },
    /// Print a participant's current value of `key`
    GetState {
        participant: String,
        key: String,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Trigger `action` on `receiver` and print the reply
    Trigger {
        receiver: String,
        action: String,
        /// JSON payload (default `{}`)
        payload: Option<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Print the patterns `receiver` is subscribed to
    Subscriptions {
        receiver: String,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Republish broker client notices as lifecycle signals
    Lifecycle,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    plugwire::utils::logging::init("info");

    let cmd = Command::parse();
    if let Err(e) = run(cmd).await {
        error!("{e}");
        std::process::exit(1);
    }
}

struct Session {
    messenger: Messenger,
    transport: MqttTransport,
    events: JoinHandle<()>,
}

impl Session {
    async fn open(settings: &Settings) -> Result<Self> {
        let participant = Participant::from_settings(&settings.participant);
        let client_id = participant.client_id();
        let (transport, events) = MqttTransport::connect(&settings.transport, &client_id);
        let messenger = Messenger::new(participant, client_id, Arc::new(transport.clone()));
        messenger.set_subscribe_on_connect(settings.participant.subscribe_on_connect);
        messenger.set_query_settings(&settings.query);
        let events = messenger.spawn(events);

        if !messenger.wait_connected(CONNECT_TIMEOUT).await {
            return Err(WireError::NotConnected);
        }
        info!("connected as {}", messenger.client_id());
        Ok(Self {
            messenger,
            transport,
            events,
        })
    }

    /// Flush queued requests and close the connection.
    async fn close(self) {
        if let Err(e) = self.transport.disconnect().await {
            error!("disconnect failed: {e}");
        }
        let _ = tokio::time::timeout(Duration::from_secs(1), self.events).await;
    }
}

async fn run(cmd: Command) -> Result<()> {
    let settings = load_config()?;
    let session = Session::open(&settings).await?;
    let messenger = session.messenger.clone();
    let timeout = |ms: Option<u64>, default: Duration| ms.map_or(default, Duration::from_millis);

    let result = match cmd {
        Command::Watch { templates } => watch(&messenger, &templates).await,
        Command::Publish {
            topic,
            payload,
            retain,
            qos,
        } => {
            let payload: Value = serde_json::from_str(&payload)?;
            messenger.send_message(&topic, payload, retain, Qos::try_from(qos)?)
        }
        Command::GetState {
            participant,
            key,
            timeout_ms,
        } => {
            let value = match timeout_ms {
                Some(ms) => {
                    messenger
                        .get_state(&participant, &key, Duration::from_millis(ms))
                        .await
                }
                None => messenger.get_state_default(&participant, &key).await,
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Command::Trigger {
            receiver,
            action,
            payload,
            timeout_ms,
        } => {
            let value: Value = match payload {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Value::Object(Default::default()),
            };
            let reply = messenger
                .call_action(
                    &receiver,
                    &action,
                    value,
                    ActionKind::Trigger,
                    timeout(timeout_ms, settings.query.action_timeout()),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&reply.response)?);
            Ok(())
        }
        Command::Subscriptions {
            receiver,
            timeout_ms,
        } => {
            let patterns = messenger
                .get_subscriptions(&receiver, timeout(timeout_ms, settings.query.action_timeout()))
                .await?;
            for pattern in patterns {
                println!("{pattern}");
            }
            Ok(())
        }
        Command::Lifecycle => lifecycle(&messenger, &session.transport).await,
    };

    session.close().await;
    result
}

async fn watch(messenger: &Messenger, templates: &[String]) -> Result<()> {
    for template in templates {
        messenger.add_subscription(template, |inbound| {
            let now = chrono::Local::now().format("%H:%M:%S%.3f");
            println!("[{now}] {} {}", inbound.topic(), inbound.payload());
        })?;
    }
    info!("watching {}", templates.join(", "));
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received. Exiting gracefully.");
    Ok(())
}

async fn lifecycle(messenger: &Messenger, transport: &MqttTransport) -> Result<()> {
    let events = SysEventSource::attach(messenger)?;
    let broadcaster = LifecycleBroadcaster::new(messenger.base(), Arc::new(transport.clone()));

    tokio::select! {
        _ = broadcaster.run(events) => {
            error!("lifecycle event source closed unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }
    Ok(())
}
