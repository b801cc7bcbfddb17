use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager as RedisConnection;
use redis::AsyncCommands;
use tokio::sync::broadcast;

use crate::config::BusBackend;
use crate::dispatch::FanoutDispatcher;

use super::{BroadcastBus, BusError, ExponentialBackoff, RelayEnvelope, WireEnvelope};

/// Publishes envelopes on a Redis Pub/Sub channel shared by all instances
pub struct RedisBus {
    connection: RedisConnection,
    channel: String,
}

impl RedisBus {
    pub async fn connect(url: &str, channel: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url)?;
        let connection = RedisConnection::new(client).await?;
        Ok(Self {
            connection,
            channel: channel.to_string(),
        })
    }
}

#[async_trait]
impl BroadcastBus for RedisBus {
    async fn publish(&self, envelope: RelayEnvelope) -> Result<(), BusError> {
        let json = serde_json::to_string(&envelope.to_wire())?;
        let mut conn = self.connection.clone();
        let receivers: i64 = conn.publish(&self.channel, json).await?;

        tracing::debug!(
            channel = %self.channel,
            room = %envelope.room,
            receivers,
            "Envelope published"
        );
        Ok(())
    }

    fn backend(&self) -> BusBackend {
        BusBackend::Redis
    }
}

/// Feeds envelopes from the Redis channel into this instance's dispatcher.
///
/// Envelopes are delivered one at a time in arrival order, which keeps a
/// single producer's events ordered per room.
pub struct BusSubscriber {
    url: String,
    channel: String,
    dispatcher: Arc<FanoutDispatcher>,
    shutdown: broadcast::Sender<()>,
    /// Subscribed at construction so a signal sent before `start` is kept
    shutdown_rx: broadcast::Receiver<()>,
}

impl BusSubscriber {
    pub fn new(url: &str, channel: &str, dispatcher: Arc<FanoutDispatcher>) -> Self {
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        Self {
            url: url.to_string(),
            channel: channel.to_string(),
            dispatcher,
            shutdown,
            shutdown_rx,
        }
    }

    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Run until shutdown, reconnecting with backoff on failure
    pub async fn start(mut self) {
        let mut backoff = ExponentialBackoff::new();
        let mut shutdown_rx = std::mem::replace(&mut self.shutdown_rx, self.shutdown.subscribe());

        tracing::info!(channel = %self.channel, "Starting bus subscriber");

        loop {
            match self.run_subscription_loop(&mut backoff, &mut shutdown_rx).await {
                Ok(()) => {
                    tracing::info!("Bus subscriber stopped gracefully");
                    break;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::error!(
                        error = %e,
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "Bus subscription error, reconnecting"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn run_subscription_loop(
        &self,
        backoff: &mut ExponentialBackoff,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<(), BusError> {
        let client = redis::Client::open(self.url.as_str())?;
        let connect = async {
            let mut pubsub = client.get_async_pubsub().await?;
            pubsub.subscribe(&self.channel).await?;
            Ok::<_, BusError>(pubsub)
        };

        let mut pubsub = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                tracing::info!("Received shutdown signal while connecting");
                return Ok(());
            }
            pubsub = connect => pubsub?,
        };

        backoff.reset();
        tracing::info!(channel = %self.channel, "Bus subscription established");

        let mut message_stream = pubsub.on_message();

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::info!("Received shutdown signal");
                    return Ok(());
                }
                msg = message_stream.next() => {
                    let Some(msg) = msg else {
                        tracing::warn!("Bus message stream ended");
                        return Err(redis::RedisError::from((
                            redis::ErrorKind::IoError,
                            "pubsub stream closed",
                        ))
                        .into());
                    };

                    match msg.get_payload::<String>() {
                        Ok(payload) => self.handle_message(&payload).await,
                        Err(e) => tracing::warn!(error = %e, "Failed to get message payload"),
                    }
                }
            }
        }
    }

    async fn handle_message(&self, payload: &str) {
        let envelope = match serde_json::from_str::<WireEnvelope>(payload)
            .map_err(|e| e.to_string())
            .and_then(|wire| wire.into_envelope().map_err(|e| e.to_string()))
        {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed bus envelope");
                return;
            }
        };

        self.dispatcher
            .deliver(&envelope.room, &envelope.event)
            .await;
    }
}
