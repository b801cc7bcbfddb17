use std::sync::Arc;
use std::time::Instant;

use crate::auth::AuthGateway;
use crate::bus::{create_bus, BroadcastBus, BusError, LocalBus};
use crate::config::Settings;
use crate::connection_manager::ConnectionManager;
use crate::dispatch::FanoutDispatcher;
use crate::ingress::IngressGateway;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub gateway: Arc<AuthGateway>,
    pub connections: Arc<ConnectionManager>,
    pub dispatcher: Arc<FanoutDispatcher>,
    pub ingress: Arc<IngressGateway>,
    pub start_time: Instant,
}

impl AppState {
    /// State with the in-process bus
    pub fn new(settings: Settings) -> Self {
        let connections = Arc::new(ConnectionManager::new());
        let dispatcher = Arc::new(FanoutDispatcher::new(connections.clone()));
        let bus: Arc<dyn BroadcastBus> = Arc::new(LocalBus::new(dispatcher.clone()));
        Self::assemble(settings, connections, dispatcher, bus)
    }

    /// State with the bus selected by `bus.backend`
    pub async fn from_settings(settings: Settings) -> Result<Self, BusError> {
        let connections = Arc::new(ConnectionManager::new());
        let dispatcher = Arc::new(FanoutDispatcher::new(connections.clone()));
        let bus = create_bus(&settings, dispatcher.clone()).await?;
        Ok(Self::assemble(settings, connections, dispatcher, bus))
    }

    fn assemble(
        settings: Settings,
        connections: Arc<ConnectionManager>,
        dispatcher: Arc<FanoutDispatcher>,
        bus: Arc<dyn BroadcastBus>,
    ) -> Self {
        Self {
            gateway: Arc::new(AuthGateway::new(&settings)),
            settings: Arc::new(settings),
            connections,
            dispatcher,
            ingress: Arc::new(IngressGateway::new(bus)),
            start_time: Instant::now(),
        }
    }
}
