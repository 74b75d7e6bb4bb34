//! Participant identity
//!
//! `Participant` is who a process is on the bus: the deployment's `base`
//! namespace, its own name and version, and where it lives on disk if it is
//! a plugin process.

use uuid::Uuid;

use crate::config::ParticipantSettings;
use crate::protocol::identity::decamelize;
use crate::protocol::{CompoundClientId, Header};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub base: String,
    pub name: String,
    pub version: String,
    pub path: Option<String>,
}

impl Participant {
    pub fn new(base: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            name: name.into(),
            version: "0.0".to_string(),
            path: None,
        }
    }

    /// Name a participant after its type, e.g. `DeviceModel` -> `device-model`.
    pub fn from_type_name(base: impl Into<String>, type_name: &str) -> Self {
        Self::new(base, decamelize(type_name))
    }

    pub fn from_settings(settings: &ParticipantSettings) -> Self {
        let name = settings.name.clone().unwrap_or_else(|| {
            let id = Uuid::new_v4().simple().to_string();
            format!("plugwire-{}", &id[..8])
        });
        Self {
            base: settings.base.clone(),
            name,
            version: settings.version.clone(),
            path: settings.path.clone(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn header(&self) -> Header {
        Header::new(self.name.clone(), self.version.clone())
    }

    /// Client id to connect with: `name>>path>>session` for plugins on
    /// disk, the bare name otherwise.
    pub fn client_id(&self) -> String {
        CompoundClientId::generate(&self.name, self.path.as_deref()).to_string()
    }
}
