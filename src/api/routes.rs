use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::emit::{emit_event, emit_new_message, emit_queue_count, emit_update_message};
use super::health::{health, stats, tenant_rooms};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
}

/// Worker ingress and tenant introspection; the caller layers the
/// bearer-secret check on top
pub fn ingress_routes() -> Router<AppState> {
    Router::new()
        .route("/rooms/{tenant_id}", get(tenant_rooms))
        .route("/emit", post(emit_event))
        .route("/emit/new", post(emit_new_message))
        .route("/emit/update", post(emit_update_message))
        .route("/emit/queue-count", post(emit_queue_count))
}
