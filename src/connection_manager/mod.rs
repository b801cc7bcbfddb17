//! Membership registry: which connections are in which rooms.
//!
//! [`ConnectionManager`] is the only owner of the room maps; everything else
//! goes through its operations.

mod registry;
mod stats;
mod types;

pub use registry::ConnectionManager;
pub use stats::{RegistryStats, RoomInfo};
pub use types::{ConnectionHandle, ConnectionId};
