//! Topic taxonomy
//!
//! Every message on the bus belongs to one family. The family decides the
//! shape of the topic:
//!
//! | Family  | Topic                                      |
//! |---------|--------------------------------------------|
//! | state   | `{base}/{sender}/state/{key}`              |
//! | error   | `{base}/{sender}/error/{key}`              |
//! | put     | `{base}/put/{receiver}/{key}`              |
//! | notify  | `{base}/{sender}/notify/{receiver}/{endpoint}` |
//! | status  | `{base}/status/{sender}`                   |
//! | trigger | `{base}/trigger/{receiver}/{action}`       |
//! | signal  | `{base}/{sender}/signal/{topic}`           |
//!
//! Fields may hold `{placeholder}` segments when an `Address` is used to
//! build a route template rather than a concrete topic.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    State,
    Error,
    Put,
    Notify,
    Status,
    Trigger,
    Signal,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::State => "state",
            Family::Error => "error",
            Family::Put => "put",
            Family::Notify => "notify",
            Family::Status => "status",
            Family::Trigger => "trigger",
            Family::Signal => "signal",
        }
    }

    /// Whether sends in this family are retained by the broker unless the
    /// caller says otherwise. Only state is.
    pub fn retained_by_default(&self) -> bool {
        matches!(self, Family::State)
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-typed topic: the family plus the identifiers it carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    State { sender: String, key: String },
    Error { sender: String, key: String },
    Put { receiver: String, key: String },
    Notify { sender: String, receiver: String, endpoint: String },
    Status { sender: String },
    Trigger { receiver: String, action: String },
    Signal { sender: String, topic: String },
}

impl Address {
    pub fn state(sender: impl Into<String>, key: impl Into<String>) -> Self {
        Address::State {
            sender: sender.into(),
            key: key.into(),
        }
    }

    pub fn error(sender: impl Into<String>, key: impl Into<String>) -> Self {
        Address::Error {
            sender: sender.into(),
            key: key.into(),
        }
    }

    pub fn put(receiver: impl Into<String>, key: impl Into<String>) -> Self {
        Address::Put {
            receiver: receiver.into(),
            key: key.into(),
        }
    }

    pub fn notify(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Address::Notify {
            sender: sender.into(),
            receiver: receiver.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn status(sender: impl Into<String>) -> Self {
        Address::Status {
            sender: sender.into(),
        }
    }

    pub fn trigger(receiver: impl Into<String>, action: impl Into<String>) -> Self {
        Address::Trigger {
            receiver: receiver.into(),
            action: action.into(),
        }
    }

    pub fn signal(sender: impl Into<String>, topic: impl Into<String>) -> Self {
        Address::Signal {
            sender: sender.into(),
            topic: topic.into(),
        }
    }

    pub fn family(&self) -> Family {
        match self {
            Address::State { .. } => Family::State,
            Address::Error { .. } => Family::Error,
            Address::Put { .. } => Family::Put,
            Address::Notify { .. } => Family::Notify,
            Address::Status { .. } => Family::Status,
            Address::Trigger { .. } => Family::Trigger,
            Address::Signal { .. } => Family::Signal,
        }
    }

    /// The family-specific identifier at the end of the topic.
    pub fn key(&self) -> &str {
        match self {
            Address::State { key, .. } | Address::Error { key, .. } | Address::Put { key, .. } => {
                key
            }
            Address::Notify { endpoint, .. } => endpoint,
            Address::Status { sender } => sender,
            Address::Trigger { action, .. } => action,
            Address::Signal { topic, .. } => topic,
        }
    }

    /// Render the canonical topic under `base`.
    pub fn topic(&self, base: &str) -> String {
        match self {
            Address::State { sender, key } => format!("{base}/{sender}/state/{key}"),
            Address::Error { sender, key } => format!("{base}/{sender}/error/{key}"),
            Address::Put { receiver, key } => format!("{base}/put/{receiver}/{key}"),
            Address::Notify {
                sender,
                receiver,
                endpoint,
            } => format!("{base}/{sender}/notify/{receiver}/{endpoint}"),
            Address::Status { sender } => format!("{base}/status/{sender}"),
            Address::Trigger { receiver, action } => format!("{base}/trigger/{receiver}/{action}"),
            Address::Signal { sender, topic } => format!("{base}/{sender}/signal/{topic}"),
        }
    }

    /// Classify a concrete topic. Returns `None` for topics outside `base`
    /// or outside the grammar. Fixed-prefix families (`put`, `status`,
    /// `trigger`) are recognised before sender-prefixed ones.
    pub fn parse(base: &str, topic: &str) -> Option<Address> {
        let rest = topic.strip_prefix(base)?.strip_prefix('/')?;
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }

        match segments.as_slice() {
            ["put", receiver, key] => Some(Address::put(*receiver, *key)),
            ["status", sender] => Some(Address::status(*sender)),
            ["trigger", receiver, action] => Some(Address::trigger(*receiver, *action)),
            [sender, "state", key] => Some(Address::state(*sender, *key)),
            [sender, "error", key] => Some(Address::error(*sender, *key)),
            [sender, "signal", topic] => Some(Address::signal(*sender, *topic)),
            [sender, "notify", receiver, endpoint] => {
                Some(Address::notify(*sender, *receiver, *endpoint))
            }
            _ => None,
        }
    }
}
