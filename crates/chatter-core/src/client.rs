//! Client records and the slot arena that owns them.
//!
//! The arena replaces the intrusive linked list of the wire protocol's
//! ancestry: clients live in stable slots addressed by [`ClientId`], so the
//! activity heap and room member sets can hold plain handles that are
//! invalidated in O(1) when a client is destroyed.

use std::net::SocketAddrV4;

/// Maximum number of names on one client's mute list.
pub const MAX_MUTED: usize = 16;

/// Stable handle to a client slot in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub(crate) u32);

/// One active chat participant.
#[derive(Debug)]
pub struct Client {
    pub name: String,
    pub addr: SocketAddrV4,
    /// Sender names this client refuses delivery from. Insertion order,
    /// capped at `MAX_MUTED`, duplicates rejected.
    muted: Vec<String>,
    /// Name of the room this client is in, if any. Mutually consistent
    /// with that room's member set.
    pub room: Option<String>,
    /// Last-activity timestamp (monotonic milliseconds).
    pub last_active: u64,
    /// Set once the sweeper has pinged this client and is waiting for
    /// any datagram back.
    pub awaiting_pong: bool,
    /// When the outstanding ping was sent (monotonic milliseconds).
    pub last_ping_sent: u64,
    /// Position of this client in the activity heap, or `None` if absent.
    pub(crate) heap_index: Option<usize>,
}

impl Client {
    pub fn new(name: &str, addr: SocketAddrV4, now: u64) -> Self {
        Self {
            name: name.to_owned(),
            addr,
            muted: Vec::new(),
            room: None,
            last_active: now,
            awaiting_pong: false,
            last_ping_sent: 0,
            heap_index: None,
        }
    }

    /// Add `target` to the mute list. Fails (returns false) on duplicate
    /// or when the list is full.
    pub fn mute(&mut self, target: &str) -> bool {
        if self.muted.iter().any(|m| m == target) {
            return false;
        }
        if self.muted.len() >= MAX_MUTED {
            return false;
        }
        self.muted.push(target.to_owned());
        true
    }

    /// Remove `target` from the mute list, keeping the remaining entries
    /// in order. Returns false if it was not present.
    pub fn unmute(&mut self, target: &str) -> bool {
        match self.muted.iter().position(|m| m == target) {
            Some(i) => {
                self.muted.remove(i);
                true
            }
            None => false,
        }
    }

    /// True if this client has muted `sender_name`.
    pub fn is_muted(&self, sender_name: &str) -> bool {
        self.muted.iter().any(|m| m == sender_name)
    }
}

/// Slot arena owning every active [`Client`].
///
/// Freed slots are recycled; a `ClientId` is only valid until its client is
/// removed. All handle holders (heap, room member sets) are purged in the
/// same critical section as the removal.
#[derive(Debug, Default)]
pub struct ClientArena {
    slots: Vec<Option<Client>>,
    free: Vec<u32>,
}

impl ClientArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&mut self, client: Client) -> ClientId {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(client);
                ClientId(slot)
            }
            None => {
                self.slots.push(Some(client));
                ClientId((self.slots.len() - 1) as u32)
            }
        }
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.slots.get_mut(id.0 as usize)?.as_mut()
    }

    pub fn remove(&mut self, id: ClientId) -> Option<Client> {
        let slot = self.slots.get_mut(id.0 as usize)?;
        let client = slot.take()?;
        self.free.push(id.0);
        Some(client)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClientId, &Client)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|c| (ClientId(i as u32), c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new([127, 0, 0, 1].into(), port)
    }

    #[test]
    fn test_mute_rejects_duplicates_and_overflow() {
        let mut c = Client::new("alice", addr(40001), 0);
        assert!(c.mute("bob"));
        assert!(!c.mute("bob"));
        assert!(c.is_muted("bob"));
        for i in 1..MAX_MUTED {
            assert!(c.mute(&format!("peer-{i}")));
        }
        // List is now full
        assert!(!c.mute("one-too-many"));
        assert!(!c.is_muted("one-too-many"));
    }

    #[test]
    fn test_unmute_compacts_in_order() {
        let mut c = Client::new("alice", addr(40001), 0);
        c.mute("a");
        c.mute("b");
        c.mute("c");
        assert!(c.unmute("b"));
        assert!(!c.unmute("b"));
        assert!(c.is_muted("a"));
        assert!(!c.is_muted("b"));
        assert!(c.is_muted("c"));
        // Freed capacity is reusable
        for i in 0..MAX_MUTED - 2 {
            assert!(c.mute(&format!("peer-{i}")));
        }
        assert!(!c.mute("overflow"));
    }

    #[test]
    fn test_arena_recycles_slots() {
        let mut arena = ClientArena::new();
        let a = arena.insert(Client::new("a", addr(1), 0));
        let b = arena.insert(Client::new("b", addr(2), 0));
        assert_eq!(arena.len(), 2);
        arena.remove(a);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.len(), 1);
        let c = arena.insert(Client::new("c", addr(3), 0));
        // The freed slot is reused
        assert_eq!(c, a);
        assert_eq!(arena.get(b).unwrap().name, "b");
        assert_eq!(arena.iter().count(), 2);
    }
}
