//! Connection handle and related types

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::websocket::{OutboundMessage, ServerMessage};

pub type ConnectionId = Uuid;

/// Sending side of a tenant-bound connection
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub tenant_id: String,
    pub sender: mpsc::Sender<OutboundMessage>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(
        id: ConnectionId,
        tenant_id: impl Into<String>,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        Self {
            id,
            tenant_id: tenant_id.into(),
            sender,
            connected_at: Utc::now(),
        }
    }

    /// Send a ServerMessage (will be serialized when sent to WebSocket)
    pub async fn send(
        &self,
        message: ServerMessage,
    ) -> Result<(), mpsc::error::SendError<OutboundMessage>> {
        self.sender.send(OutboundMessage::Raw(message)).await
    }

    /// Send a pre-serialized message (for efficient multi-send scenarios)
    pub async fn send_preserialized(
        &self,
        message: OutboundMessage,
    ) -> Result<(), mpsc::error::SendError<OutboundMessage>> {
        self.sender.send(message).await
    }
}
