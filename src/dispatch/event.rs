use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Event names a producer may emit into a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Notify,
    NewMessage,
    UpdateMessage,
    QueueCount,
    TenantEvent,
    QueueEvent,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Notify,
        EventKind::NewMessage,
        EventKind::UpdateMessage,
        EventKind::QueueCount,
        EventKind::TenantEvent,
        EventKind::QueueEvent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Notify => "notify",
            EventKind::NewMessage => "new_message",
            EventKind::UpdateMessage => "update_message",
            EventKind::QueueCount => "queue_count",
            EventKind::TenantEvent => "tenant_event",
            EventKind::QueueEvent => "queue_event",
        }
    }
}

impl FromStr for EventKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| RelayError::InvalidEvent(s.to_string()))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authorized event ready for fan-out. Data is carried verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEvent {
    pub kind: EventKind,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl RelayEvent {
    pub fn new(kind: EventKind, data: serde_json::Value) -> Self {
        Self { kind, data }
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }
}
