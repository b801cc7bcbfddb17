use serde::{Deserialize, Serialize};

use crate::dispatch::{EventKind, RelayEvent};
use crate::error::RelayError;
use crate::room::{RoomKey, RoomTarget};

/// An authorized event bound to its resolved room
#[derive(Debug, Clone, PartialEq)]
pub struct RelayEnvelope {
    pub room: RoomKey,
    pub event: RelayEvent,
}

impl RelayEnvelope {
    pub fn new(room: RoomKey, event: RelayEvent) -> Self {
        Self { room, event }
    }

    pub fn to_wire(&self) -> WireEnvelope {
        WireEnvelope {
            target: self.room.to_target(),
            event: self.event.kind,
            data: self.event.data.clone(),
        }
    }
}

/// JSON form published on the backplane channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub target: RoomTarget,
    pub event: EventKind,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl WireEnvelope {
    /// Re-derive the room key so a malformed payload on the channel can
    /// never address a room the key scheme would not produce.
    pub fn into_envelope(self) -> Result<RelayEnvelope, RelayError> {
        let room = self.target.resolve()?;
        Ok(RelayEnvelope::new(room, RelayEvent::new(self.event, self.data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_envelope_preserves_room_and_payload() {
        let room = RoomKey::agent("acme", "ana@acme.com").unwrap();
        let envelope = RelayEnvelope::new(
            room.clone(),
            RelayEvent::new(EventKind::NewMessage, json!({"text": "hi"})),
        );

        let json = serde_json::to_string(&envelope.to_wire()).unwrap();
        let wire: WireEnvelope = serde_json::from_str(&json).unwrap();
        let restored = wire.into_envelope().unwrap();

        assert_eq!(restored, envelope);
        assert_eq!(restored.room.as_str(), room.as_str());
    }

    #[test]
    fn test_wire_envelope_rejects_bad_target_and_event() {
        let bad_target = json!({
            "target": {"tenant_id": "acme", "scope": "user"},
            "event": "notify",
            "data": {}
        });
        let wire: WireEnvelope = serde_json::from_value(bad_target).unwrap();
        assert_eq!(wire.into_envelope().unwrap_err().code(), "invalid_target");

        let bad_event = json!({
            "target": {"tenant_id": "acme", "scope": "tenant"},
            "event": "shutdown",
        });
        assert!(serde_json::from_value::<WireEnvelope>(bad_event).is_err());
    }
}
