//! API layer - HTTP endpoint handlers.

mod emit;
mod health;
mod metrics;
mod routes;

pub use emit::{
    emit_event, emit_new_message, emit_queue_count, emit_update_message, EmitBody,
    EmitResponse, NewMessageBody, QueueCountBody, UpdateMessageBody,
};
pub use health::{health, stats, tenant_rooms};
pub use metrics::prometheus_metrics;
pub use routes::{api_routes, ingress_routes};
