// Core
pub mod auth;
pub mod connection_manager;
pub mod dispatch;
pub mod ingress;
pub mod room;

// Transport & application layer
pub mod api;
pub mod bus;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;
