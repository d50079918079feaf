//! Server-wide counters sampled by the stats logger.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

/// Atomic operational counters.
/// All writes use Relaxed ordering — these are sampling metrics, not synchronisation.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub datagrams_received: AtomicU64,
    /// Datagrams dropped before dispatch: no `$`, unknown command, bad bytes.
    pub datagrams_malformed: AtomicU64,
    pub commands_handled: AtomicU64,

    pub connects: AtomicU64,
    pub disconnects: AtomicU64,
    pub kicks: AtomicU64,
    pub evictions: AtomicU64,
    pub pings_sent: AtomicU64,

    pub messages_global: AtomicU64,
    pub messages_room: AtomicU64,
    pub messages_private: AtomicU64,

    /// `send_to` failures. A lost datagram is a normal occurrence on UDP;
    /// these are logged and counted, never fatal.
    pub sends_failed: AtomicU64,
}

/// Plain-struct snapshot of [`ServerStats`] for display and logging.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub datagrams_received: u64,
    pub datagrams_malformed: u64,
    pub commands_handled: u64,
    pub connects: u64,
    pub disconnects: u64,
    pub kicks: u64,
    pub evictions: u64,
    pub pings_sent: u64,
    pub messages_global: u64,
    pub messages_room: u64,
    pub messages_private: u64,
    pub sends_failed: u64,
    /// Gauges sampled from the registries at snapshot time.
    pub active_clients: usize,
    pub active_rooms: usize,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, active_clients: usize, active_rooms: usize) -> StatsSnapshot {
        StatsSnapshot {
            datagrams_received: self.datagrams_received.load(Relaxed),
            datagrams_malformed: self.datagrams_malformed.load(Relaxed),
            commands_handled: self.commands_handled.load(Relaxed),
            connects: self.connects.load(Relaxed),
            disconnects: self.disconnects.load(Relaxed),
            kicks: self.kicks.load(Relaxed),
            evictions: self.evictions.load(Relaxed),
            pings_sent: self.pings_sent.load(Relaxed),
            messages_global: self.messages_global.load(Relaxed),
            messages_room: self.messages_room.load(Relaxed),
            messages_private: self.messages_private.load(Relaxed),
            sends_failed: self.sends_failed.load(Relaxed),
            active_clients,
            active_rooms,
        }
    }
}
