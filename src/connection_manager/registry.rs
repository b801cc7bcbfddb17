use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::metrics::RegistryMetrics;
use crate::room::RoomKey;

use super::{ConnectionHandle, ConnectionId, RegistryStats, RoomInfo};

/// A registered connection and the rooms it currently occupies
struct ConnectionEntry {
    handle: Arc<ConnectionHandle>,
    rooms: HashSet<RoomKey>,
}

/// Tracks room membership for tenant-bound connections.
///
/// Lock order is always `connections` entry, then `rooms` entry. `members_of`
/// reads `rooms` and releases it before touching `connections`, so no path
/// holds a `rooms` guard while waiting on `connections`.
pub struct ConnectionManager {
    /// connection_id -> handle + occupied rooms (inverse index)
    connections: DashMap<ConnectionId, ConnectionEntry>,
    /// room -> member connection ids; only non-empty rooms are present
    rooms: DashMap<RoomKey, HashSet<ConnectionId>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Register a tenant-bound connection. Returns false if the id is already
    /// registered.
    pub fn register(&self, handle: Arc<ConnectionHandle>) -> bool {
        let id = handle.id;
        let tenant_id = handle.tenant_id.clone();
        let mut inserted = false;

        self.connections.entry(id).or_insert_with(|| {
            inserted = true;
            ConnectionEntry {
                handle,
                rooms: HashSet::new(),
            }
        });

        if inserted {
            RegistryMetrics::set_connections(self.connections.len());
            tracing::info!(connection_id = %id, tenant_id = %tenant_id, "Connection registered");
        }
        inserted
    }

    pub fn is_registered(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    /// Add a connection to a room. Idempotent; a no-op for unregistered
    /// connections. Returns true only when membership was newly created.
    pub fn join(&self, connection_id: ConnectionId, room: &RoomKey) -> bool {
        let Some(mut entry) = self.connections.get_mut(&connection_id) else {
            tracing::debug!(connection_id = %connection_id, room = %room, "Join ignored for unregistered connection");
            return false;
        };

        if !entry.rooms.insert(room.clone()) {
            return false;
        }

        self.rooms
            .entry(room.clone())
            .or_default()
            .insert(connection_id);
        drop(entry);

        RegistryMetrics::set_rooms(self.rooms.len());
        tracing::debug!(connection_id = %connection_id, room = %room, "Joined room");
        true
    }

    /// Remove a connection from a room. Idempotent. Returns true only when a
    /// membership was removed.
    pub fn leave(&self, connection_id: ConnectionId, room: &RoomKey) -> bool {
        let Some(mut entry) = self.connections.get_mut(&connection_id) else {
            return false;
        };

        if !entry.rooms.remove(room) {
            return false;
        }

        self.detach(connection_id, room);
        drop(entry);

        RegistryMetrics::set_rooms(self.rooms.len());
        tracing::debug!(connection_id = %connection_id, room = %room, "Left room");
        true
    }

    /// Remove a connection from every room it holds and forget it.
    ///
    /// Once this returns, the connection is absent from every membership set
    /// and `members_of` no longer yields its handle. Returns the rooms left.
    pub fn leave_all(&self, connection_id: ConnectionId) -> Vec<RoomKey> {
        let Some((_, entry)) = self.connections.remove(&connection_id) else {
            return Vec::new();
        };

        for room in &entry.rooms {
            self.detach(connection_id, room);
        }

        RegistryMetrics::set_connections(self.connections.len());
        RegistryMetrics::set_rooms(self.rooms.len());
        tracing::info!(
            connection_id = %connection_id,
            rooms = entry.rooms.len(),
            "Connection unregistered"
        );

        entry.rooms.into_iter().collect()
    }

    /// Point-in-time snapshot of a room's member handles
    pub fn members_of(&self, room: &RoomKey) -> Vec<Arc<ConnectionHandle>> {
        let ids = self.member_ids(room);

        ids.into_iter()
            .filter_map(|id| self.connections.get(&id).map(|e| e.handle.clone()))
            .collect()
    }

    /// Point-in-time snapshot of a room's member ids
    pub fn member_ids(&self, room: &RoomKey) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Rooms a connection currently occupies
    pub fn rooms_of(&self, connection_id: ConnectionId) -> Vec<RoomKey> {
        self.connections
            .get(&connection_id)
            .map(|e| e.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn room_exists(&self, room: &RoomKey) -> bool {
        self.rooms.contains_key(room)
    }

    /// Rooms belonging to one tenant, with member counts
    pub fn list_rooms(&self, tenant_id: &str) -> Vec<RoomInfo> {
        self.rooms
            .iter()
            .filter(|r| r.key().tenant_id() == tenant_id)
            .map(|r| RoomInfo {
                name: r.key().to_string(),
                member_count: r.value().len(),
            })
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_connections: self.connections.len(),
            total_rooms: self.rooms.len(),
            total_memberships: self.rooms.iter().map(|r| r.value().len()).sum(),
            oldest_connection_at: self
                .connections
                .iter()
                .map(|c| c.value().handle.connected_at)
                .min(),
        }
    }

    fn detach(&self, connection_id: ConnectionId, room: &RoomKey) {
        let now_empty = match self.rooms.get_mut(room) {
            Some(mut members) => {
                members.remove(&connection_id);
                members.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
