//! Route templates
//!
//! A template is a `/`-separated topic where whole segments may be written
//! as `{name}`. Each placeholder becomes a single-level wildcard (`+`) in
//! the derived subscription pattern and captures the concrete segment when
//! a message is matched. Raw `+` and a trailing `#` are accepted as
//! uncaptured wildcards.

use std::collections::BTreeMap;
use std::fmt;

use crate::utils::{Result, WireError};

/// Placeholder name to the concrete segment it matched.
pub type Params = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Single,
    Multi,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl RouteTemplate {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(WireError::InvalidTemplate(raw.to_string()));
        }

        let parts: Vec<&str> = raw.split('/').collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "+" => Segment::Single,
                "#" if i == parts.len() - 1 => Segment::Multi,
                p if p.len() > 2 && p.starts_with('{') && p.ends_with('}') => {
                    let name = &p[1..p.len() - 1];
                    if name.contains(['{', '}']) {
                        return Err(WireError::InvalidTemplate(raw.to_string()));
                    }
                    Segment::Param(name.to_string())
                }
                p if p.contains(['{', '}', '+', '#']) => {
                    return Err(WireError::InvalidTemplate(raw.to_string()));
                }
                p => Segment::Literal(p.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The transport subscription for this template: every placeholder
    /// segment replaced by `+`, everything else unchanged.
    pub fn pattern(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(s) => s.as_str(),
                Segment::Param(_) | Segment::Single => "+",
                Segment::Multi => "#",
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Match a concrete topic, returning the captured placeholders.
    ///
    /// As in MQTT, a wildcard or placeholder in the first level never
    /// matches a topic starting with `$`.
    pub fn matches(&self, topic: &str) -> Option<Params> {
        if topic.starts_with('$') && !matches!(self.segments.first(), Some(Segment::Literal(_))) {
            return None;
        }
        let mut params = Params::new();
        let mut parts = topic.split('/');

        for segment in &self.segments {
            match segment {
                Segment::Multi => return Some(params),
                _ => {
                    let part = parts.next()?;
                    match segment {
                        Segment::Literal(s) if s != part => return None,
                        Segment::Param(name) => {
                            if part.is_empty() {
                                return None;
                            }
                            params.insert(name.clone(), part.to_string());
                        }
                        _ => {}
                    }
                }
            }
        }

        match parts.next() {
            Some(_) => None,
            None => Some(params),
        }
    }
}

impl fmt::Display for RouteTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
