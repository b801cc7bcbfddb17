//! Authorization choke-point for producer-submitted events.
//!
//! Both live `server_emit` frames and HTTP ingress calls land here. Every
//! submission is checked on its own; nothing about a previous decision is
//! cached.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::auth::AuthContext;
use crate::bus::{BroadcastBus, RelayEnvelope};
use crate::dispatch::{EventKind, RelayEvent};
use crate::error::RelayError;
use crate::metrics::IngressMetrics;
use crate::room::{RoomKey, RoomTarget};

/// Where a submission came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressOrigin {
    Live,
    Http,
}

impl IngressOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngressOrigin::Live => "live",
            IngressOrigin::Http => "http",
        }
    }
}

/// A producer's request to emit one event into one room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitRequest {
    pub target: RoomTarget,
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EmitRequest {
    pub fn new(target: RoomTarget, event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            target,
            event: event.into(),
            data,
        }
    }
}

pub struct IngressGateway {
    bus: Arc<dyn BroadcastBus>,
}

impl IngressGateway {
    pub fn new(bus: Arc<dyn BroadcastBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<dyn BroadcastBus> {
        &self.bus
    }

    /// Apply the emit policy: worker role, allow-listed event, same tenant,
    /// well-formed room. The first failing check decides the error.
    pub fn authorize(
        &self,
        ctx: &AuthContext,
        request: &EmitRequest,
    ) -> Result<RelayEnvelope, RelayError> {
        if !ctx.is_worker() {
            return Err(RelayError::NotAuthorized);
        }

        let kind: EventKind = request.event.parse()?;

        if ctx.tenant_id() != request.target.tenant_id {
            tracing::warn!(
                security_event = "tenant_mismatch",
                bound_tenant = %ctx.tenant_id(),
                requested_tenant = %request.target.tenant_id,
                event = %kind,
                "Rejected cross-tenant emit"
            );
            return Err(RelayError::TenantMismatch);
        }

        let room: RoomKey = request.target.resolve()?;

        Ok(RelayEnvelope::new(
            room,
            RelayEvent::new(kind, request.data.clone()),
        ))
    }

    /// Authorize and hand the event to the broadcast bus
    #[tracing::instrument(
        name = "ingress.submit",
        skip(self, ctx, request),
        fields(
            origin = origin.as_str(),
            tenant_id = %ctx.tenant_id(),
            role = ctx.role().as_str(),
            event = %request.event
        )
    )]
    pub async fn submit(
        &self,
        ctx: &AuthContext,
        request: EmitRequest,
        origin: IngressOrigin,
    ) -> Result<(), RelayError> {
        let envelope = match self.authorize(ctx, &request) {
            Ok(envelope) => envelope,
            Err(e) => {
                IngressMetrics::record_rejected(origin.as_str(), e.code());
                tracing::debug!(code = e.code(), error = %e, "Emit rejected");
                return Err(e);
            }
        };

        let room = envelope.room.clone();
        if let Err(e) = self.bus.publish(envelope).await {
            tracing::error!(error = %e, room = %room, "Failed to publish event");
            let err = RelayError::Unavailable(e.to_string());
            IngressMetrics::record_rejected(origin.as_str(), err.code());
            return Err(err);
        }

        IngressMetrics::record_accepted(origin.as_str());
        tracing::debug!(room = %room, "Emit accepted");
        Ok(())
    }
}
