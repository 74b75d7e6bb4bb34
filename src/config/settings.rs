use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for a participant process.
///
/// Includes settings for the transport connection, the participant's own
/// identity and the bounded-wait calls.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub transport: TransportSettings,
    pub participant: ParticipantSettings,
    pub query: QuerySettings,
}

/// Where and how to reach the broker.
///
/// Native participants use `port` (TCP); browser-style participants use
/// `ws_port` with `websocket` enabled.
#[derive(Debug, Deserialize, Clone)]
pub struct TransportSettings {
    pub host: String,
    pub port: u16,
    pub ws_port: u16,
    pub websocket: bool,
    pub keep_alive_secs: u64,
    pub channel_capacity: usize,
}

/// Identity of this participant on the bus.
#[derive(Debug, Deserialize, Clone)]
pub struct ParticipantSettings {
    /// Application namespace shared by every participant of one deployment.
    pub base: String,
    pub name: Option<String>,
    pub version: String,
    /// Filesystem location of the plugin. Browser-style participants leave this unset.
    pub path: Option<String>,
    /// Subscribe routes registered while disconnected once the connection comes up.
    pub subscribe_on_connect: bool,
}

/// Timeouts for the bounded-wait primitives.
#[derive(Debug, Deserialize, Clone)]
pub struct QuerySettings {
    pub timeout_ms: u64,
    pub action_timeout_ms: u64,
}

/// Partial configuration settings loaded from files or environment.
///
/// Settings as read from files and the environment. Missing values are filled from defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub transport: Option<PartialTransportSettings>,
    pub participant: Option<PartialParticipantSettings>,
    pub query: Option<PartialQuerySettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialTransportSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ws_port: Option<u16>,
    pub websocket: Option<bool>,
    pub keep_alive_secs: Option<u64>,
    pub channel_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialParticipantSettings {
    pub base: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub path: Option<String>,
    pub subscribe_on_connect: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PartialQuerySettings {
    pub timeout_ms: Option<u64>,
    pub action_timeout_ms: Option<u64>,
}

impl QuerySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            transport: TransportSettings {
                host: "localhost".to_string(),
                port: 1883,
                ws_port: 8083,
                websocket: false,
                keep_alive_secs: 30,
                channel_capacity: 64,
            },
            participant: ParticipantSettings {
                base: "microdrop".to_string(),
                name: None,
                version: "0.0".to_string(),
                path: None,
                subscribe_on_connect: false,
            },
            query: QuerySettings {
                timeout_ms: 500,
                action_timeout_ms: 10_000,
            },
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        let Settings {
            transport: dt,
            participant: dp,
            query: dq,
        } = defaults;

        let transport = match self.transport {
            Some(t) => TransportSettings {
                host: t.host.unwrap_or(dt.host),
                port: t.port.unwrap_or(dt.port),
                ws_port: t.ws_port.unwrap_or(dt.ws_port),
                websocket: t.websocket.unwrap_or(dt.websocket),
                keep_alive_secs: t.keep_alive_secs.unwrap_or(dt.keep_alive_secs),
                channel_capacity: t.channel_capacity.unwrap_or(dt.channel_capacity),
            },
            None => dt,
        };

        let participant = match self.participant {
            Some(p) => ParticipantSettings {
                base: p.base.unwrap_or(dp.base),
                name: p.name.or(dp.name),
                version: p.version.unwrap_or(dp.version),
                path: p.path.or(dp.path),
                subscribe_on_connect: p.subscribe_on_connect.unwrap_or(dp.subscribe_on_connect),
            },
            None => dp,
        };

        let query = match self.query {
            Some(q) => QuerySettings {
                timeout_ms: q.timeout_ms.unwrap_or(dq.timeout_ms),
                action_timeout_ms: q.action_timeout_ms.unwrap_or(dq.action_timeout_ms),
            },
            None => dq,
        };

        Settings {
            transport,
            participant,
            query,
        }
    }
}
