//! Activity min-heap: clients ordered by last-activity timestamp.
//!
//! The sweeper needs the stalest client in O(1) and cheap reordering when a
//! client shows life. Each client stores its own heap position, so removal
//! and update are O(log n) by handle. Every swap repairs both clients'
//! stored positions — the structure hinges on that.

use crate::client::{ClientArena, ClientId};

/// Binary min-heap of client handles keyed on `last_active`.
#[derive(Debug, Default)]
pub struct ActivityHeap {
    slots: Vec<ClientId>,
}

impl ActivityHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The stalest client, or `None` if the heap is empty.
    pub fn peek(&self) -> Option<ClientId> {
        self.slots.first().copied()
    }

    /// Insert a client and record its position on the client record.
    pub fn push(&mut self, id: ClientId, arena: &mut ClientArena) {
        self.slots.push(id);
        let idx = self.slots.len() - 1;
        if let Some(c) = arena.get_mut(id) {
            c.heap_index = Some(idx);
        }
        self.sift_up(idx, arena);
    }

    /// Remove a client by its stored position. No-op if it is not in the heap.
    pub fn remove(&mut self, id: ClientId, arena: &mut ClientArena) {
        let Some(idx) = arena.get(id).and_then(|c| c.heap_index) else {
            return;
        };
        if idx >= self.slots.len() || self.slots[idx] != id {
            return;
        }
        let last = self.slots.len() - 1;
        if idx != last {
            self.swap(idx, last, arena);
        }
        self.slots.pop();
        if idx < self.slots.len() {
            self.sift_down(idx, arena);
            self.sift_up(idx, arena);
        }
        if let Some(c) = arena.get_mut(id) {
            c.heap_index = None;
        }
    }

    /// Restore ordering after a client's timestamp changed. Sifts both
    /// directions, so either direction of change is tolerated.
    pub fn update(&mut self, id: ClientId, arena: &mut ClientArena) {
        let Some(idx) = arena.get(id).and_then(|c| c.heap_index) else {
            return;
        };
        if idx >= self.slots.len() || self.slots[idx] != id {
            return;
        }
        self.sift_down(idx, arena);
        self.sift_up(idx, arena);
    }

    fn key(&self, idx: usize, arena: &ClientArena) -> u64 {
        arena
            .get(self.slots[idx])
            .map(|c| c.last_active)
            .unwrap_or(u64::MAX)
    }

    fn swap(&mut self, a: usize, b: usize, arena: &mut ClientArena) {
        self.slots.swap(a, b);
        if let Some(c) = arena.get_mut(self.slots[a]) {
            c.heap_index = Some(a);
        }
        if let Some(c) = arena.get_mut(self.slots[b]) {
            c.heap_index = Some(b);
        }
    }

    fn sift_up(&mut self, mut idx: usize, arena: &mut ClientArena) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.key(parent, arena) <= self.key(idx, arena) {
                break;
            }
            self.swap(parent, idx, arena);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize, arena: &mut ClientArena) {
        loop {
            let left = idx * 2 + 1;
            let right = left + 1;
            let mut smallest = idx;
            if left < self.slots.len() && self.key(left, arena) < self.key(smallest, arena) {
                smallest = left;
            }
            if right < self.slots.len() && self.key(right, arena) < self.key(smallest, arena) {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.swap(idx, smallest, arena);
            idx = smallest;
        }
    }
}
