//! Named rooms: a fixed-bucket hash table keyed by djb2 of the room name.
//!
//! A room exists only while it has members; the emptiness rule is enforced
//! by [`crate::state::detach_from_room`], which is the sole place a member
//! leaves a room.

use crate::client::ClientId;
use crate::history::HistoryRing;
use crate::wire;

/// Number of hash buckets in the room table.
pub const ROOM_BUCKETS: usize = 32;

fn djb2(name: &str) -> usize {
    let mut hash: u32 = 5381;
    for b in name.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as u32);
    }
    hash as usize % ROOM_BUCKETS
}

/// A named sub-channel with its own member set and backlog.
#[derive(Debug)]
pub struct Room {
    pub name: String,
    members: Vec<ClientId>,
    pub history: HistoryRing,
}

impl Room {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            members: Vec::new(),
            history: HistoryRing::new(),
        }
    }

    /// Link a member. No-op if already present.
    pub fn add_member(&mut self, id: ClientId) {
        if !self.members.contains(&id) {
            self.members.push(id);
        }
    }

    /// Unlink a member. The caller clears the client's room back-reference
    /// in the same critical section.
    pub fn remove_member(&mut self, id: ClientId) {
        self.members.retain(|&m| m != id);
    }

    pub fn is_member(&self, id: ClientId) -> bool {
        self.members.contains(&id)
    }

    pub fn members(&self) -> &[ClientId] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Hash table of rooms, chained per bucket.
#[derive(Debug)]
pub struct RoomTable {
    buckets: Vec<Vec<Room>>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self {
            buckets: (0..ROOM_BUCKETS).map(|_| Vec::new()).collect(),
        }
    }

    pub fn find(&self, name: &str) -> Option<&Room> {
        self.buckets[djb2(name)].iter().find(|r| r.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Room> {
        self.buckets[djb2(name)].iter_mut().find(|r| r.name == name)
    }

    /// Create a room. Fails on a duplicate or invalid name.
    pub fn insert(&mut self, name: &str) -> Option<&mut Room> {
        if !wire::valid_name(name) || self.find(name).is_some() {
            return None;
        }
        let bucket = &mut self.buckets[djb2(name)];
        bucket.push(Room::new(name));
        bucket.last_mut()
    }

    /// Delete a room and all its membership links.
    pub fn remove(&mut self, name: &str) -> Option<Room> {
        let bucket = &mut self.buckets[djb2(name)];
        let idx = bucket.iter().position(|r| r.name == name)?;
        Some(bucket.swap_remove(idx))
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.buckets.iter().flatten()
    }
}

impl Default for RoomTable {
    fn default() -> Self {
        Self::new()
    }
}
