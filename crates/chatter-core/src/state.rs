//! Shared server state and the composite operations that span both
//! registries.
//!
//! # Lock order
//!
//! The client registry (arena + heap + global history) sits behind one
//! readers/writer lock; the room table has its own mutex. Any operation that
//! touches both — room create/join/leave/kick, client destruction — acquires
//! the **client write lock first, then the room mutex**, and holds both for
//! the whole critical section. Never acquire them in the reverse order.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::client::{Client, ClientId};
use crate::registry::Registry;
use crate::rooms::RoomTable;
use crate::stats::ServerStats;

/// Everything the listener, workers, and sweeper share.
#[derive(Debug, Default)]
pub struct ServerState {
    clients: RwLock<Registry>,
    rooms: Mutex<RoomTable>,
    pub stats: ServerStats,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(Registry::new()),
            rooms: Mutex::new(RoomTable::new()),
            stats: ServerStats::new(),
        }
    }

    /// Read lock on the client registry.
    pub fn clients_read(&self) -> RwLockReadGuard<'_, Registry> {
        self.clients.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write lock on the client registry.
    pub fn clients_write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.clients.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Room table lock. Acquire only while holding the client write lock
    /// when the operation mutates membership.
    pub fn rooms_lock(&self) -> MutexGuard<'_, RoomTable> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Detach a client from its current room, if any. Clears the client's room
/// back-reference, unlinks it from the member set, and deletes the room the
/// instant the member set empties. Returns the name of the room left.
///
/// This is the only operation that takes a member out of a room.
pub fn detach_from_room(reg: &mut Registry, rooms: &mut RoomTable, id: ClientId) -> Option<String> {
    let room_name = reg.client_mut(id)?.room.take()?;
    if let Some(room) = rooms.find_mut(&room_name) {
        room.remove_member(id);
        if room.is_empty() {
            rooms.remove(&room_name);
        }
    }
    Some(room_name)
}

/// Destroy a client: detach it from its room, drop it from the heap and the
/// arena, and return the record.
pub fn remove_client(reg: &mut Registry, rooms: &mut RoomTable, id: ClientId) -> Option<Client> {
    detach_from_room(reg, rooms, id);
    reg.remove(id)
}
