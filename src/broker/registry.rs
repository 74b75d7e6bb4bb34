//! Plugin registry
//!
//! A participant-side view of which plugin processes are connected, built
//! from the broker's lifecycle signals. Callers create and own the
//! registry; nothing about it is global.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::broker::{BROKER_NAME, CLIENT_CONNECTED, CLIENT_DISCONNECTED};
use crate::client::Messenger;
use crate::protocol::ClientLifecycle;
use crate::routing::RouteId;
use crate::utils::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginEntry {
    pub path: String,
    /// Milliseconds since the epoch when the connect signal was seen.
    pub connected_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: Arc<Mutex<BTreeMap<String, PluginEntry>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, PluginEntry>> {
        self.plugins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Follow the broker's lifecycle signals through `messenger`.
    pub fn attach(&self, messenger: &Messenger) -> Result<[RouteId; 2]> {
        let registry = self.clone();
        let connected = messenger.on_signal(BROKER_NAME, CLIENT_CONNECTED, move |inbound| {
            match ClientLifecycle::from_value(inbound.payload()) {
                Ok(client) => registry.register_client(client),
                Err(e) => warn!("ignoring {}: {e}", inbound.topic()),
            }
        })?;

        let registry = self.clone();
        let disconnected = messenger.on_signal(BROKER_NAME, CLIENT_DISCONNECTED, move |inbound| {
            match ClientLifecycle::from_value(inbound.payload()) {
                Ok(client) => registry.remove_client(&client.client_name),
                Err(e) => warn!("ignoring {}: {e}", inbound.topic()),
            }
        })?;

        Ok([connected, disconnected])
    }

    pub fn register_client(&self, client: ClientLifecycle) {
        info!("plugin {} connected from {}", client.client_name, client.client_path);
        self.lock().insert(
            client.client_name,
            PluginEntry {
                path: client.client_path,
                connected_at: chrono::Utc::now().timestamp_millis(),
            },
        );
    }

    pub fn remove_client(&self, name: &str) {
        if self.lock().remove(name).is_some() {
            info!("plugin {name} disconnected");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<PluginEntry> {
        self.lock().get(name).cloned()
    }

    /// Connected plugins as `(name, path)`, ordered by name.
    pub fn plugins(&self) -> Vec<(String, String)> {
        self.lock()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.path.clone()))
            .collect()
    }
}
