use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::room::{RoomScope, RoomTarget};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    Identify(IdentifyPayload),
    JoinRoom(RoomRequest),
    LeaveRoom(RoomRequest),
    ServerEmit(EmitPayload),
    Ping,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Identify(_) => "identify",
            ClientMessage::JoinRoom(_) => "join_room",
            ClientMessage::LeaveRoom(_) => "leave_room",
            ClientMessage::ServerEmit(_) => "server_emit",
            ClientMessage::Ping => "ping",
        }
    }
}

/// Acknowledgment id carried next to `type`/`payload` in a client frame
#[derive(Debug, Default, Deserialize)]
pub struct FrameMeta {
    #[serde(default)]
    pub id: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifyPayload {
    #[serde(default, alias = "tenantId")]
    pub tenant_id: Option<String>,
    #[serde(default, alias = "principalId", alias = "email")]
    pub principal_id: Option<String>,
    /// Queue names to subscribe to
    #[serde(default, alias = "rooms")]
    pub subscriptions: Vec<String>,
}

/// Room addressed by `join_room` / `leave_room`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoomRequest {
    Scoped {
        #[serde(default, alias = "tenantId")]
        tenant_id: Option<String>,
        scope: RoomScope,
        #[serde(default)]
        discriminator: Option<String>,
    },
    User {
        #[serde(default, alias = "tenantId")]
        tenant_id: Option<String>,
        #[serde(alias = "userId")]
        user_id: String,
    },
    /// Bare user id
    Bare(String),
}

impl RoomRequest {
    /// Resolve against the connection's bound tenant. A request naming any
    /// other tenant is rejected.
    pub fn into_target(self, bound_tenant: &str) -> Result<RoomTarget, RelayError> {
        let (tenant, scope, discriminator) = match self {
            RoomRequest::Scoped {
                tenant_id,
                scope,
                discriminator,
            } => (tenant_id, scope, discriminator),
            RoomRequest::User { tenant_id, user_id } => (tenant_id, RoomScope::User, Some(user_id)),
            RoomRequest::Bare(user_id) => (None, RoomScope::User, Some(user_id)),
        };

        match tenant {
            Some(t) if t != bound_tenant => Err(RelayError::TenantMismatch),
            _ => Ok(RoomTarget::new(bound_tenant, scope, discriminator)),
        }
    }
}

/// Worker-submitted event over a live connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitPayload {
    #[serde(alias = "tenantId")]
    pub tenant_id: String,
    pub scope: RoomScope,
    #[serde(default)]
    pub discriminator: Option<String>,
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Fanned-out room event, name and data untouched
    Event {
        event: String,
        data: serde_json::Value,
    },
    Ack {
        id: u64,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Pong,
    Error {
        code: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn event(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self::Event {
            event: event.into(),
            data,
        }
    }

    pub fn ack(id: u64, result: Result<(), &RelayError>) -> Self {
        match result {
            Ok(()) => Self::Ack {
                id,
                ok: true,
                error: None,
            },
            Err(e) => Self::Ack {
                id,
                ok: false,
                error: Some(e.code().to_string()),
            },
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Message queued on a connection's outbound buffer
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Raw(ServerMessage),
    /// JSON serialized once and shared across a fan-out
    Preserialized(Arc<str>),
}

impl OutboundMessage {
    pub fn preserialized(message: &ServerMessage) -> Result<Self, serde_json::Error> {
        Ok(Self::Preserialized(serde_json::to_string(message)?.into()))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            OutboundMessage::Raw(message) => serde_json::to_string(message),
            OutboundMessage::Preserialized(json) => Ok(json.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_identify() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"identify","payload":{"tenantId":"acme","email":"ana@acme.com","rooms":["Sales","Support"]}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Identify(p) => {
                assert_eq!(p.tenant_id.as_deref(), Some("acme"));
                assert_eq!(p.principal_id.as_deref(), Some("ana@acme.com"));
                assert_eq!(p.subscriptions, vec!["Sales", "Support"]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_join_room_shapes() {
        let bare: ClientMessage =
            serde_json::from_str(r#"{"type":"join_room","payload":"U1"}"#).unwrap();
        let user: ClientMessage = serde_json::from_str(
            r#"{"type":"join_room","payload":{"tenantId":"acme","userId":"U1"}}"#,
        )
        .unwrap();
        let scoped: ClientMessage = serde_json::from_str(
            r#"{"type":"leave_room","payload":{"scope":"queue","discriminator":"Sales"}}"#,
        )
        .unwrap();

        assert!(matches!(bare, ClientMessage::JoinRoom(RoomRequest::Bare(ref u)) if u == "U1"));
        assert!(matches!(user, ClientMessage::JoinRoom(RoomRequest::User { .. })));
        assert!(matches!(
            scoped,
            ClientMessage::LeaveRoom(RoomRequest::Scoped {
                scope: RoomScope::Queue,
                ..
            })
        ));
    }

    #[test]
    fn test_frame_meta_alongside_message() {
        let text = r#"{"type":"ping","id":42}"#;
        let msg: ClientMessage = serde_json::from_str(text).unwrap();
        let meta: FrameMeta = serde_json::from_str(text).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
        assert_eq!(meta.id, Some(42));
    }

    #[test]
    fn test_room_request_tenant_check() {
        let req = RoomRequest::User {
            tenant_id: Some("beta".to_string()),
            user_id: "U1".to_string(),
        };
        assert_eq!(req.into_target("acme"), Err(RelayError::TenantMismatch));

        let target = RoomRequest::Bare("U1".to_string()).into_target("acme").unwrap();
        assert_eq!(target.tenant_id, "acme");
        assert_eq!(target.scope, RoomScope::User);
    }

    #[test]
    fn test_server_event_shape() {
        let msg = ServerMessage::event("notify", json!({"x": 1}));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"type": "event", "event": "notify", "data": {"x": 1}}));
    }

    #[test]
    fn test_ack_shape() {
        let ok = serde_json::to_value(ServerMessage::ack(7, Ok(()))).unwrap();
        assert_eq!(ok, json!({"type": "ack", "id": 7, "ok": true}));

        let err = serde_json::to_value(ServerMessage::ack(8, Err(&RelayError::TenantMismatch)))
            .unwrap();
        assert_eq!(
            err,
            json!({"type": "ack", "id": 8, "ok": false, "error": "tenant_mismatch"})
        );
    }

    #[test]
    fn test_preserialized_matches_raw() {
        let msg = ServerMessage::event("queue_count", json!({"queue": "Sales", "count": 3}));
        let pre = OutboundMessage::preserialized(&msg).unwrap();
        assert_eq!(
            pre.to_json().unwrap(),
            OutboundMessage::Raw(msg).to_json().unwrap()
        );
    }
}
