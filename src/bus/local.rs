use std::sync::Arc;

use async_trait::async_trait;

use crate::config::BusBackend;
use crate::dispatch::FanoutDispatcher;

use super::{BroadcastBus, BusError, RelayEnvelope};

/// Single-instance bus: publishing is delivery
pub struct LocalBus {
    dispatcher: Arc<FanoutDispatcher>,
}

impl LocalBus {
    pub fn new(dispatcher: Arc<FanoutDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl BroadcastBus for LocalBus {
    async fn publish(&self, envelope: RelayEnvelope) -> Result<(), BusError> {
        self.dispatcher
            .deliver(&envelope.room, &envelope.event)
            .await;
        Ok(())
    }

    fn backend(&self) -> BusBackend {
        BusBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_manager::{ConnectionHandle, ConnectionManager};
    use crate::dispatch::{EventKind, RelayEvent};
    use crate::room::RoomKey;
    use serde_json::json;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_publish_delivers_before_returning() {
        let manager = Arc::new(ConnectionManager::new());
        let bus = LocalBus::new(Arc::new(FanoutDispatcher::new(manager.clone())));
        let room = RoomKey::user("acme", "U1").unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let handle = Arc::new(ConnectionHandle::new(Uuid::new_v4(), "acme", tx));
        manager.register(handle.clone());
        manager.join(handle.id, &room);

        bus.publish(RelayEnvelope::new(
            room,
            RelayEvent::new(EventKind::Notify, json!({"x": 1})),
        ))
        .await
        .unwrap();

        assert!(rx.try_recv().is_ok());
        assert_eq!(bus.backend(), BusBackend::Local);
    }
}
