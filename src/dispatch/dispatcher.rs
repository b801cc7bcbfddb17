use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;

use crate::connection_manager::{ConnectionHandle, ConnectionManager};
use crate::metrics::MessageMetrics;
use crate::room::RoomKey;
use crate::websocket::{OutboundMessage, ServerMessage};

use super::RelayEvent;

/// Maximum number of concurrent message sends
const MAX_CONCURRENT_SENDS: usize = 100;

/// Above this member count the frame is serialized once and shared
const SEQUENTIAL_SEND_LIMIT: usize = 3;

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    /// Members the event was pushed to
    pub delivered: usize,
    /// Members whose transport was already gone
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub total_dispatched: AtomicU64,
    pub total_delivered: AtomicU64,
    pub total_failed: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_dispatched: self.total_dispatched.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_dispatched: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
}

/// Delivers events to every current member of a room.
///
/// Best effort: a member whose transport is closing is counted as failed and
/// skipped. `deliver` returns only after every push has completed, so a
/// caller issuing deliveries in sequence preserves their order at each member.
pub struct FanoutDispatcher {
    connection_manager: Arc<ConnectionManager>,
    stats: DispatcherStats,
}

impl FanoutDispatcher {
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self {
            connection_manager,
            stats: DispatcherStats::default(),
        }
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    #[tracing::instrument(
        name = "dispatcher.deliver",
        skip(self, event),
        fields(room = %room, event = %event.kind)
    )]
    pub async fn deliver(&self, room: &RoomKey, event: &RelayEvent) -> DeliveryResult {
        let members = self.connection_manager.members_of(room);
        let message = ServerMessage::event(event.name(), event.data.clone());

        let (delivered, failed) = self.send_to_connections(&members, &message).await;

        self.stats.total_dispatched.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats
            .total_failed
            .fetch_add(failed as u64, Ordering::Relaxed);
        MessageMetrics::record_dispatch(delivered as u64, failed as u64);

        tracing::debug!(
            room = %room,
            event = %event.kind,
            members = members.len(),
            delivered,
            failed,
            "Event dispatched"
        );

        DeliveryResult { delivered, failed }
    }

    async fn send_to_connections(
        &self,
        connections: &[Arc<ConnectionHandle>],
        message: &ServerMessage,
    ) -> (usize, usize) {
        if connections.is_empty() {
            return (0, 0);
        }

        let mut delivered = 0;
        let mut failed = 0;

        if connections.len() <= SEQUENTIAL_SEND_LIMIT {
            for conn in connections {
                match conn.send(message.clone()).await {
                    Ok(_) => delivered += 1,
                    Err(_) => {
                        tracing::debug!(connection_id = %conn.id, "Delivery to closed connection dropped");
                        failed += 1
                    }
                }
            }
            return (delivered, failed);
        }

        let outbound = match OutboundMessage::preserialized(message) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to pre-serialize message, falling back to per-connection serialization");
                OutboundMessage::Raw(message.clone())
            }
        };

        let mut futures = FuturesUnordered::new();
        let mut pending = 0;

        for conn in connections {
            let conn = conn.clone();
            let msg = outbound.clone();
            futures.push(async move { conn.send_preserialized(msg).await.is_ok() });
            pending += 1;

            while pending >= MAX_CONCURRENT_SENDS {
                match futures.next().await {
                    Some(ok) => {
                        pending -= 1;
                        if ok {
                            delivered += 1;
                        } else {
                            failed += 1;
                        }
                    }
                    None => break,
                }
            }
        }

        while let Some(ok) = futures.next().await {
            if ok {
                delivered += 1;
            } else {
                failed += 1;
            }
        }

        (delivered, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::EventKind;
    use serde_json::json;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn connect(
        manager: &ConnectionManager,
        room: &RoomKey,
        buffer: usize,
    ) -> (Uuid, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        let handle = Arc::new(ConnectionHandle::new(Uuid::new_v4(), room.tenant_id(), tx));
        let id = handle.id;
        manager.register(handle);
        manager.join(id, room);
        (id, rx)
    }

    fn decode(msg: OutboundMessage) -> ServerMessage {
        serde_json::from_str(&msg.to_json().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_deliver_reaches_exactly_the_members() {
        let manager = Arc::new(ConnectionManager::new());
        let dispatcher = FanoutDispatcher::new(manager.clone());
        let room = RoomKey::user("acme", "U1").unwrap();
        let other = RoomKey::user("acme", "U2").unwrap();

        let (_, mut c1) = connect(&manager, &room, 4);
        let (_, mut c2) = connect(&manager, &room, 4);
        let (_, mut c3) = connect(&manager, &room, 4);
        let (_, mut outsider) = connect(&manager, &other, 4);

        let event = RelayEvent::new(EventKind::Notify, json!({"x": 1}));
        let result = dispatcher.deliver(&room, &event).await;

        assert_eq!(result, DeliveryResult { delivered: 3, failed: 0 });
        for rx in [&mut c1, &mut c2, &mut c3] {
            let msg = decode(rx.try_recv().unwrap());
            assert_eq!(msg, ServerMessage::event("notify", json!({"x": 1})));
            assert!(rx.try_recv().is_err());
        }
        assert!(outsider.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_member_does_not_abort_fanout() {
        let manager = Arc::new(ConnectionManager::new());
        let dispatcher = FanoutDispatcher::new(manager.clone());
        let room = RoomKey::queue("acme", "Sales").unwrap();

        let mut open = Vec::new();
        for i in 0..6 {
            let (_, rx) = connect(&manager, &room, 4);
            if i % 2 == 0 {
                drop(rx);
            } else {
                open.push(rx);
            }
        }

        let event = RelayEvent::new(EventKind::QueueEvent, json!({"n": 1}));
        let result = dispatcher.deliver(&room, &event).await;

        assert_eq!(result.delivered, 3);
        assert_eq!(result.failed, 3);
        for rx in &mut open {
            assert!(matches!(rx.try_recv(), Ok(OutboundMessage::Preserialized(_))));
        }
    }

    #[tokio::test]
    async fn test_sequential_deliveries_keep_order() {
        let manager = Arc::new(ConnectionManager::new());
        let dispatcher = FanoutDispatcher::new(manager.clone());
        let room = RoomKey::tenant("acme").unwrap();

        let mut receivers = Vec::new();
        for _ in 0..5 {
            receivers.push(connect(&manager, &room, 16).1);
        }

        for n in 0..10 {
            let event = RelayEvent::new(EventKind::TenantEvent, json!({"seq": n}));
            dispatcher.deliver(&room, &event).await;
        }

        for rx in &mut receivers {
            for n in 0..10 {
                match decode(rx.try_recv().unwrap()) {
                    ServerMessage::Event { data, .. } => assert_eq!(data["seq"], n),
                    other => panic!("unexpected message: {:?}", other),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_no_delivery_after_leave_all() {
        let manager = Arc::new(ConnectionManager::new());
        let dispatcher = FanoutDispatcher::new(manager.clone());
        let room = RoomKey::user("acme", "U1").unwrap();

        let (id, mut rx) = connect(&manager, &room, 4);
        manager.leave_all(id);

        let event = RelayEvent::new(EventKind::Notify, json!(null));
        let result = dispatcher.deliver(&room, &event).await;

        assert_eq!(result, DeliveryResult::default());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let manager = Arc::new(ConnectionManager::new());
        let dispatcher = FanoutDispatcher::new(manager.clone());
        let room = RoomKey::user("acme", "U1").unwrap();
        let (_, _rx) = connect(&manager, &room, 4);

        let event = RelayEvent::new(EventKind::Notify, json!({}));
        dispatcher.deliver(&room, &event).await;
        dispatcher.deliver(&room, &event).await;

        let stats = dispatcher.stats();
        assert_eq!(stats.total_dispatched, 2);
        assert_eq!(stats.total_delivered, 2);
        assert_eq!(stats.total_failed, 0);
    }
}
