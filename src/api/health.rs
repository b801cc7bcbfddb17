//! Health check and statistics endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::config::{AuthMode, BusBackend};
use crate::connection_manager::{RegistryStats, RoomInfo};
use crate::dispatch::DispatcherStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub registry: RegistryStats,
    pub dispatcher: DispatcherStatsSnapshot,
    pub auth_mode: AuthMode,
    pub bus: BusBackend,
}

#[derive(Debug, Serialize)]
pub struct TenantRoomsResponse {
    pub tenant_id: String,
    pub rooms: Vec<RoomInfo>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections: state.connections.stats().total_connections,
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        registry: state.connections.stats(),
        dispatcher: state.dispatcher.stats(),
        auth_mode: state.gateway.mode(),
        bus: state.ingress.bus().backend(),
    })
}

/// GET /rooms/{tenant_id} - active rooms of one tenant, behind the ingress secret
pub async fn tenant_rooms(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Json<TenantRoomsResponse> {
    let rooms = state.connections.list_rooms(&tenant_id);
    Json(TenantRoomsResponse { tenant_id, rooms })
}
