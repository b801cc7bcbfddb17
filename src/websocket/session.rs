use std::sync::Arc;

use tokio::sync::mpsc;

use crate::auth::{AuthContext, AuthGateway};
use crate::connection_manager::{ConnectionHandle, ConnectionId, ConnectionManager};
use crate::error::RelayError;
use crate::room::{RoomKey, RoomScope};

use super::message::{IdentifyPayload, OutboundMessage, RoomRequest, ServerMessage};

/// Per-connection state, owned by the connection's task.
///
/// A session with no [`AuthContext`] is not registered and holds no rooms.
/// Once attached, the context never changes.
pub struct ConnectionSession {
    id: ConnectionId,
    sender: mpsc::Sender<OutboundMessage>,
    registry: Arc<ConnectionManager>,
    auth: Option<AuthContext>,
    principal: Option<String>,
    /// Current user room when single-active-room semantics apply
    active_room: Option<RoomKey>,
    exclusive: bool,
}

impl ConnectionSession {
    pub fn new(
        id: ConnectionId,
        sender: mpsc::Sender<OutboundMessage>,
        registry: Arc<ConnectionManager>,
        exclusive: bool,
    ) -> Self {
        Self {
            id,
            sender,
            registry,
            auth: None,
            principal: None,
            active_room: None,
            exclusive,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn auth(&self) -> Option<&AuthContext> {
        self.auth.as_ref()
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn active_room(&self) -> Option<&RoomKey> {
        self.active_room.as_ref()
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.auth.as_ref().map(|ctx| ctx.tenant_id())
    }

    /// Bind the session to an identity and register it for fan-out.
    /// A second attach is only accepted if it is the same identity.
    pub fn attach(&mut self, ctx: AuthContext) -> Result<(), RelayError> {
        if let Some(existing) = &self.auth {
            if existing.tenant_id() != ctx.tenant_id() {
                return Err(RelayError::TenantMismatch);
            }
            if existing.role() != ctx.role() {
                return Err(RelayError::NotAuthorized);
            }
            return Ok(());
        }

        let handle = Arc::new(ConnectionHandle::new(
            self.id,
            ctx.tenant_id(),
            self.sender.clone(),
        ));
        self.registry.register(handle);
        self.principal = ctx.principal().map(str::to_string);

        tracing::info!(
            connection_id = %self.id,
            tenant_id = %ctx.tenant_id(),
            role = ctx.role().as_str(),
            "Connection bound to tenant"
        );
        self.auth = Some(ctx);
        Ok(())
    }

    /// Bind a principal and initial subscriptions.
    ///
    /// An unbound session may bind its tenant here, subject to the gateway's
    /// anonymous policy. A bound session keeps its tenant and role; a payload
    /// naming another tenant is rejected. Returns the rooms joined.
    pub fn identify(
        &mut self,
        gateway: &AuthGateway,
        payload: IdentifyPayload,
    ) -> Result<Vec<RoomKey>, RelayError> {
        let bound = self.auth.as_ref().map(|ctx| ctx.tenant_id().to_string());
        match (bound.as_deref(), payload.tenant_id.as_deref()) {
            (None, Some(tenant)) => {
                let ctx = gateway.bind_anonymous(tenant)?;
                self.attach(ctx)?;
            }
            (None, None) => {
                return Err(RelayError::AuthFailed(
                    "identify requires a tenant".to_string(),
                ));
            }
            (Some(bound), Some(tenant)) if bound != tenant => {
                return Err(RelayError::TenantMismatch);
            }
            (Some(_), _) => {}
        }

        let Some(ctx) = &self.auth else {
            return Err(RelayError::AuthFailed("connection is not bound".to_string()));
        };
        let tenant = ctx.tenant_id().to_string();

        // Token-derived principals are authoritative
        if ctx.principal().is_none() {
            if let Some(principal) = payload.principal_id.filter(|p| !p.is_empty()) {
                self.principal = Some(principal);
            }
        }

        let mut rooms = Vec::new();
        if let Some(principal) = &self.principal {
            rooms.push(RoomKey::agent(&tenant, principal)?);
        }
        for queue in payload.subscriptions.iter().filter(|q| !q.is_empty()) {
            rooms.push(RoomKey::queue(&tenant, queue)?);
        }
        rooms.push(RoomKey::tenant(&tenant)?);

        for room in &rooms {
            self.registry.join(self.id, room);
        }

        tracing::info!(
            connection_id = %self.id,
            tenant_id = %tenant,
            principal = self.principal.as_deref().unwrap_or("-"),
            rooms = rooms.len(),
            "Connection identified"
        );
        Ok(rooms)
    }

    /// Join a room in the bound tenant. `Ok(None)` means the session is not
    /// bound yet and nothing happened.
    pub fn join(&mut self, request: RoomRequest) -> Result<Option<RoomKey>, RelayError> {
        let Some(ctx) = &self.auth else {
            tracing::debug!(connection_id = %self.id, "Join ignored before authentication");
            return Ok(None);
        };

        let room = request.into_target(ctx.tenant_id())?.resolve()?;

        if room.scope() == RoomScope::Agent && room.discriminator() != self.principal.as_deref() {
            return Err(RelayError::NotAuthorized);
        }

        if self.exclusive && room.scope() == RoomScope::User {
            if let Some(previous) = self.active_room.take() {
                if previous != room {
                    self.registry.leave(self.id, &previous);
                }
            }
            self.active_room = Some(room.clone());
        }

        self.registry.join(self.id, &room);
        Ok(Some(room))
    }

    /// Leave a room in the bound tenant. Same no-op rule as [`Self::join`].
    pub fn leave(&mut self, request: RoomRequest) -> Result<Option<RoomKey>, RelayError> {
        let Some(ctx) = &self.auth else {
            return Ok(None);
        };

        let room = request.into_target(ctx.tenant_id())?.resolve()?;
        if self.active_room.as_ref() == Some(&room) {
            self.active_room = None;
        }

        self.registry.leave(self.id, &room);
        Ok(Some(room))
    }

    /// Queue a frame for this connection only
    pub async fn send(&self, message: ServerMessage) {
        if self.sender.send(OutboundMessage::Raw(message)).await.is_err() {
            tracing::debug!(connection_id = %self.id, "Reply dropped, transport closed");
        }
    }

    /// Drop every membership. Called once when the transport closes.
    pub fn close(&mut self) -> Vec<RoomKey> {
        self.active_room = None;
        self.registry.leave_all(self.id)
    }
}
