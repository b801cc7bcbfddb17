//! Prometheus metrics for the relay.
//!
//! - Connection and room gauges
//! - Fan-out delivery counters
//! - Ingress accept/reject counters (rejections labelled by error code)
//! - Inbound WebSocket message counters

mod helpers;

pub use helpers::{encode_metrics, IngressMetrics, MessageMetrics, RegistryMetrics, WsMessageMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "relay";

lazy_static! {
    /// Connections registered with a tenant binding
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of tenant-bound connections"
    ).unwrap();

    /// Rooms with at least one member
    pub static ref ROOMS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_rooms_active", METRIC_PREFIX),
        "Number of rooms with at least one member"
    ).unwrap();

    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections accepted"
    ).unwrap();

    pub static ref WS_CONNECTIONS_REFUSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_refused_total", METRIC_PREFIX),
        "Total WebSocket connections refused at authentication"
    ).unwrap();

    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection lifetime in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0, 14400.0]
    ).unwrap();

    /// Events dispatched to rooms
    pub static ref EVENTS_DISPATCHED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_dispatched_total", METRIC_PREFIX),
        "Total events dispatched to rooms"
    ).unwrap();

    pub static ref EVENTS_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_delivered_total", METRIC_PREFIX),
        "Total per-connection deliveries"
    ).unwrap();

    pub static ref EVENTS_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_failed_total", METRIC_PREFIX),
        "Total per-connection delivery failures"
    ).unwrap();

    pub static ref INGRESS_ACCEPTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_ingress_accepted_total", METRIC_PREFIX),
        "Producer submissions accepted by the ingress gateway",
        &["origin"]
    ).unwrap();

    pub static ref INGRESS_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_ingress_rejected_total", METRIC_PREFIX),
        "Producer submissions rejected by the ingress gateway",
        &["origin", "code"]
    ).unwrap();

    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Client messages received by type",
        &["type"]
    ).unwrap();
}
