//! Participant names and compound client identifiers.
//!
//! Plugins that live on disk connect with a client id of the form
//! `name>>path` (optionally followed by `>>session`). Browser-style
//! participants connect with a bare name. The broker uses the difference to
//! decide whether a connection is worth announcing.

use std::fmt;
use uuid::Uuid;

/// Separator between the parts of a compound client id.
pub const DELIMITER: &str = ">>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundClientId {
    pub name: String,
    /// Set if and only if the raw id contained `DELIMITER`.
    pub path: Option<String>,
    pub session: Option<String>,
}

impl CompoundClientId {
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.splitn(3, DELIMITER);
        let name = parts.next().unwrap_or_default().to_string();
        let path = parts.next().map(str::to_string);
        let session = parts.next().map(str::to_string);
        Self {
            name,
            path,
            session,
        }
    }

    /// Client id for a participant; plugins with a path get a fresh session
    /// tag so a restarted process never collides with its previous session.
    pub fn generate(name: &str, path: Option<&str>) -> Self {
        match path {
            Some(path) => Self {
                name: name.to_string(),
                path: Some(path.to_string()),
                session: Some(Uuid::new_v4().simple().to_string()),
            },
            None => Self {
                name: name.to_string(),
                path: None,
                session: None,
            },
        }
    }

    pub fn is_plugin(&self) -> bool {
        self.path.is_some()
    }
}

impl fmt::Display for CompoundClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(path) = &self.path {
            write!(f, "{DELIMITER}{path}")?;
            if let Some(session) = &self.session {
                write!(f, "{DELIMITER}{session}")?;
            }
        }
        Ok(())
    }
}

/// Turn a type-style name into a participant name: `DeviceModel` becomes
/// `device-model`, `HTTPServer` becomes `http-server`.
pub fn decamelize(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let after_lower = prev.is_ascii_lowercase() || prev.is_ascii_digit();
            let ends_acronym = prev.is_ascii_uppercase()
                && next.is_some_and(|n| n.is_ascii_lowercase() || n.is_ascii_digit());
            if after_lower || ends_acronym {
                out.push('-');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}
