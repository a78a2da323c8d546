//! Connection registry owned by the hub task.
//!
//! [`Registry`] is a plain `HashMap` without any lock: only the hub's
//! coordination loop ever touches it, so all mutation is already
//! serialized. It also keeps the set of rooms; the lobby always exists.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{ConnectionId, Room, RoomId};
use crate::ws::connection::ConnectionHandle;

/// Public snapshot of one registered connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ClientInfo {
    /// Connection id, usable as a message target.
    #[schema(value_type = String)]
    pub connection_id: ConnectionId,
    /// Owner of the connection.
    pub user_id: i64,
    /// Display name of the owner.
    pub username: String,
    /// Room the connection belongs to.
    #[schema(value_type = String)]
    pub room: RoomId,
    /// Registration time.
    pub connected_at: DateTime<Utc>,
}

impl From<&ConnectionHandle> for ClientInfo {
    fn from(handle: &ConnectionHandle) -> Self {
        Self {
            connection_id: handle.id(),
            user_id: handle.id().user_id(),
            username: handle.username().to_string(),
            room: handle.room().clone(),
            connected_at: handle.connected_at(),
        }
    }
}

/// Public snapshot of one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoomInfo {
    /// Room id, used in `/ws/rooms/{id}`.
    #[schema(value_type = String)]
    pub id: RoomId,
    /// Display name.
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Number of connections currently in the room.
    pub clients: usize,
}

/// Mapping from [`ConnectionId`] to the running connection, plus the rooms
/// connections can join.
///
/// Keys are unique; insertion order is irrelevant.
#[derive(Debug)]
pub struct Registry {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    rooms: HashMap<RoomId, Room>,
}

impl Default for Registry {
    fn default() -> Self {
        let lobby = Room::lobby();
        Self {
            connections: HashMap::new(),
            rooms: HashMap::from([(lobby.id.clone(), lobby)]),
        }
    }
}

impl Registry {
    /// Creates a registry with no connections and only the lobby.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a connection.
    ///
    /// # Errors
    ///
    /// Hands the connection back untouched if its id is already present.
    pub fn insert(&mut self, handle: ConnectionHandle) -> Result<(), ConnectionHandle> {
        match self.connections.entry(handle.id()) {
            Entry::Occupied(_) => Err(handle),
            Entry::Vacant(slot) => {
                slot.insert(handle);
                Ok(())
            }
        }
    }

    /// Removes and returns a connection, or `None` if it is absent.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<ConnectionHandle> {
        self.connections.remove(id)
    }

    /// Returns the connection with the given id.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<&ConnectionHandle> {
        self.connections.get(id)
    }

    /// Returns `true` if the id is registered.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Iterates over all registered connections.
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.connections.values()
    }

    /// Removes every connection, returning them.
    pub fn drain(&mut self) -> Vec<ConnectionHandle> {
        self.connections.drain().map(|(_, handle)| handle).collect()
    }

    /// Returns a snapshot of every registered connection, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ClientInfo> {
        let mut clients: Vec<ClientInfo> = self.iter().map(ClientInfo::from).collect();
        clients.sort_by_key(|c| c.connected_at);
        clients
    }

    /// Iterates over the connections in one room.
    pub fn in_room<'a>(&'a self, room: &'a RoomId) -> impl Iterator<Item = &'a ConnectionHandle> {
        self.iter().filter(move |handle| handle.room() == room)
    }

    /// Returns a snapshot of one room's connections, oldest first, or
    /// `None` if the room does not exist.
    #[must_use]
    pub fn room_snapshot(&self, room: &RoomId) -> Option<Vec<ClientInfo>> {
        if !self.has_room(room) {
            return None;
        }
        let mut clients: Vec<ClientInfo> = self.in_room(room).map(ClientInfo::from).collect();
        clients.sort_by_key(|c| c.connected_at);
        Some(clients)
    }

    /// Adds a room.
    ///
    /// # Errors
    ///
    /// Hands the room back if its id is taken.
    pub fn create_room(&mut self, room: Room) -> Result<RoomInfo, Room> {
        if self.rooms.contains_key(&room.id) {
            return Err(room);
        }
        let info = self.describe(&room);
        self.rooms.insert(room.id.clone(), room);
        Ok(info)
    }

    /// Returns `true` if the room exists.
    #[must_use]
    pub fn has_room(&self, room: &RoomId) -> bool {
        self.rooms.contains_key(room)
    }

    /// Describes one room, or `None` if it does not exist.
    #[must_use]
    pub fn room(&self, room: &RoomId) -> Option<RoomInfo> {
        self.rooms.get(room).map(|r| self.describe(r))
    }

    /// Describes every room, oldest first.
    #[must_use]
    pub fn rooms(&self) -> Vec<RoomInfo> {
        let mut rooms: Vec<RoomInfo> = self.rooms.values().map(|r| self.describe(r)).collect();
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rooms
    }

    fn describe(&self, room: &Room) -> RoomInfo {
        RoomInfo {
            id: room.id.clone(),
            name: room.name.clone(),
            created_at: room.created_at,
            clients: self.in_room(&room.id).count(),
        }
    }

    /// Returns the number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
