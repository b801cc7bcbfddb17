//! Broadcast bus carrying authorized events to the fan-out dispatcher.
//!
//! `LocalBus` delivers in-process. `RedisBus` publishes on a Redis channel and
//! every relay instance runs a `BusSubscriber` that feeds its own dispatcher,
//! so a member connected to any instance receives the event.

mod backoff;
mod envelope;
mod local;
mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{BusBackend, Settings};
use crate::dispatch::FanoutDispatcher;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use envelope::{RelayEnvelope, WireEnvelope};
pub use local::LocalBus;
pub use self::redis::{BusSubscriber, RedisBus};

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Envelope serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Transport for authorized events. Publishing happens strictly after
/// ingress authorization.
#[async_trait]
pub trait BroadcastBus: Send + Sync {
    async fn publish(&self, envelope: RelayEnvelope) -> Result<(), BusError>;

    fn backend(&self) -> BusBackend;
}

/// Build the configured bus. With the Redis backend the caller is expected to
/// start a `BusSubscriber` as well, otherwise published events go nowhere.
pub async fn create_bus(
    settings: &Settings,
    dispatcher: Arc<FanoutDispatcher>,
) -> Result<Arc<dyn BroadcastBus>, BusError> {
    match settings.bus.backend {
        BusBackend::Local => {
            tracing::info!("Using in-process broadcast bus");
            Ok(Arc::new(LocalBus::new(dispatcher)))
        }
        BusBackend::Redis => {
            let bus = RedisBus::connect(&settings.redis.url, &settings.bus.channel).await?;
            tracing::info!(channel = %settings.bus.channel, "Using Redis broadcast bus");
            Ok(Arc::new(bus))
        }
    }
}
