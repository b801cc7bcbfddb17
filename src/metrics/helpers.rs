//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CONNECTIONS_ACTIVE, EVENTS_DELIVERED_TOTAL, EVENTS_DISPATCHED_TOTAL, EVENTS_FAILED_TOTAL,
    INGRESS_ACCEPTED_TOTAL, INGRESS_REJECTED_TOTAL, ROOMS_ACTIVE, WS_MESSAGES_RECEIVED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Fan-out delivery metrics
pub struct MessageMetrics;

impl MessageMetrics {
    pub fn record_dispatch(delivered: u64, failed: u64) {
        EVENTS_DISPATCHED_TOTAL.inc();
        EVENTS_DELIVERED_TOTAL.inc_by(delivered);
        EVENTS_FAILED_TOTAL.inc_by(failed);
    }
}

/// Membership registry gauges
pub struct RegistryMetrics;

impl RegistryMetrics {
    pub fn set_connections(count: usize) {
        CONNECTIONS_ACTIVE.set(count as i64);
    }

    pub fn set_rooms(count: usize) {
        ROOMS_ACTIVE.set(count as i64);
    }
}

/// Ingress gateway outcomes
pub struct IngressMetrics;

impl IngressMetrics {
    pub fn record_accepted(origin: &str) {
        INGRESS_ACCEPTED_TOTAL.with_label_values(&[origin]).inc();
    }

    pub fn record_rejected(origin: &str, code: &str) {
        INGRESS_REJECTED_TOTAL.with_label_values(&[origin, code]).inc();
    }
}

/// Inbound WebSocket message counters
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    pub fn record(kind: &str) {
        WS_MESSAGES_RECEIVED.with_label_values(&[kind]).inc();
    }
}
