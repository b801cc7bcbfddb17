//! Registry statistics and info structures

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Registry statistics
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub total_rooms: usize,
    pub total_memberships: usize,
    /// Registration time of the longest-lived connection
    pub oldest_connection_at: Option<DateTime<Utc>>,
}

/// Room information
#[derive(Debug, Clone, Serialize)]
pub struct RoomInfo {
    pub name: String,
    pub member_count: usize,
}
