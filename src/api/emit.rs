//! HTTP ingress for backend workers.
//!
//! Every route builds one or more [`EmitRequest`]s and pushes each through the
//! ingress gateway, so the HTTP surface enforces the same policy as a live
//! worker connection.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use crate::auth::AuthContext;
use crate::error::{AppError, Result};
use crate::ingress::{EmitRequest, IngressOrigin};
use crate::room::{RoomScope, RoomTarget};
use crate::server::{extract_bearer_token, AppState};
use crate::websocket::TENANT_HEADER;

/// POST /emit
#[derive(Debug, Deserialize)]
pub struct EmitBody {
    #[serde(alias = "tenantId")]
    pub tenant_id: String,
    pub scope: RoomScope,
    #[serde(default)]
    pub discriminator: Option<String>,
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// POST /emit/new
#[derive(Debug, Deserialize)]
pub struct NewMessageBody {
    #[serde(alias = "tenantId")]
    pub tenant_id: String,
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(default, alias = "assignedTo")]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub queue: Option<String>,
    pub message: serde_json::Value,
}

/// POST /emit/update
#[derive(Debug, Deserialize)]
pub struct UpdateMessageBody {
    #[serde(alias = "tenantId")]
    pub tenant_id: String,
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(default, alias = "assignedTo")]
    pub assigned_to: Option<String>,
    pub update: serde_json::Value,
}

/// POST /emit/queue-count
#[derive(Debug, Deserialize)]
pub struct QueueCountBody {
    #[serde(alias = "tenantId")]
    pub tenant_id: String,
    pub queue: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct EmitResponse {
    pub ok: bool,
}

pub async fn emit_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EmitResponse>> {
    let body: EmitBody = parse_body(&body)?;
    let ctx = caller_context(&state, &headers, &body.tenant_id)?;

    let request = EmitRequest::new(
        RoomTarget::new(body.tenant_id, body.scope, body.discriminator),
        body.event,
        body.data,
    );
    submit_all(&state, &ctx, vec![request]).await
}

pub async fn emit_new_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EmitResponse>> {
    let body: NewMessageBody = parse_body(&body)?;
    require("tenant_id", &body.tenant_id)?;
    require("user_id", &body.user_id)?;
    if body.message.is_null() {
        return Err(AppError::Validation("message is required".to_string()));
    }
    let ctx = caller_context(&state, &headers, &body.tenant_id)?;

    let tenant = body.tenant_id.as_str();
    let assigned_to = non_empty(body.assigned_to);
    let queue = non_empty(body.queue);

    let mut requests = vec![EmitRequest::new(
        user_target(tenant, &body.user_id),
        "new_message",
        body.message.clone(),
    )];
    if let Some(agent) = assigned_to {
        requests.push(EmitRequest::new(
            RoomTarget::new(tenant, RoomScope::Agent, Some(agent)),
            "new_message",
            body.message,
        ));
    }
    requests.push(EmitRequest::new(
        RoomTarget::new(tenant, RoomScope::Tenant, None),
        "tenant_event",
        json!({"type": "new_message", "user_id": body.user_id, "queue": queue}),
    ));
    if let Some(queue) = queue {
        requests.push(EmitRequest::new(
            RoomTarget::new(tenant, RoomScope::Queue, Some(queue.clone())),
            "queue_event",
            json!({"type": "new_message", "user_id": body.user_id, "queue": queue}),
        ));
    }

    submit_all(&state, &ctx, requests).await
}

pub async fn emit_update_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EmitResponse>> {
    let body: UpdateMessageBody = parse_body(&body)?;
    require("tenant_id", &body.tenant_id)?;
    require("user_id", &body.user_id)?;
    if body.update.is_null() {
        return Err(AppError::Validation("update is required".to_string()));
    }
    let ctx = caller_context(&state, &headers, &body.tenant_id)?;

    let tenant = body.tenant_id.as_str();
    let mut requests = vec![EmitRequest::new(
        user_target(tenant, &body.user_id),
        "update_message",
        body.update.clone(),
    )];
    if let Some(agent) = non_empty(body.assigned_to) {
        requests.push(EmitRequest::new(
            RoomTarget::new(tenant, RoomScope::Agent, Some(agent)),
            "update_message",
            body.update,
        ));
    }
    requests.push(EmitRequest::new(
        RoomTarget::new(tenant, RoomScope::Tenant, None),
        "tenant_event",
        json!({"type": "update_message", "user_id": body.user_id}),
    ));

    submit_all(&state, &ctx, requests).await
}

pub async fn emit_queue_count(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EmitResponse>> {
    let body: QueueCountBody = parse_body(&body)?;
    require("tenant_id", &body.tenant_id)?;
    require("queue", &body.queue)?;
    let ctx = caller_context(&state, &headers, &body.tenant_id)?;

    let request = EmitRequest::new(
        RoomTarget::new(&body.tenant_id, RoomScope::Queue, Some(body.queue.clone())),
        "queue_count",
        json!({"queue": body.queue, "count": body.count}),
    );
    submit_all(&state, &ctx, vec![request]).await
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| AppError::Validation(e.to_string()))
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn user_target(tenant: &str, user_id: &str) -> RoomTarget {
    RoomTarget::new(tenant, RoomScope::User, Some(user_id.to_string()))
}

/// The caller binds itself to the tenant named in `X-Tenant-Id`, falling back
/// to the body's tenant. A header naming another tenant than the body fails
/// the tenant check in the gateway.
fn caller_context(state: &AppState, headers: &HeaderMap, body_tenant: &str) -> Result<AuthContext> {
    let tenant = headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(body_tenant);

    Ok(state
        .gateway
        .authenticate_ingress(extract_bearer_token(headers), tenant)?)
}

/// Authorize every step up front so a rejected step emits nothing, then
/// publish in order.
async fn submit_all(
    state: &AppState,
    ctx: &AuthContext,
    requests: Vec<EmitRequest>,
) -> Result<Json<EmitResponse>> {
    for request in &requests {
        if let Err(e) = state.ingress.authorize(ctx, request) {
            crate::metrics::IngressMetrics::record_rejected(IngressOrigin::Http.as_str(), e.code());
            return Err(e.into());
        }
    }

    for request in requests {
        state.ingress.submit(ctx, request, IngressOrigin::Http).await?;
    }

    Ok(Json(EmitResponse { ok: true }))
}
