mod dispatcher;
mod event;

pub use dispatcher::{DeliveryResult, DispatcherStats, DispatcherStatsSnapshot, FanoutDispatcher};
pub use event::{EventKind, RelayEvent};
