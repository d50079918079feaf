//! Liveness sweeper: ping the stalest client, evict on ping timeout.
//!
//! The sweeper owns no state of its own. Each pass peeks the activity heap
//! under the write lock, decides on exactly one action, releases the lock,
//! then sends and sleeps. Any valid command from the pinged client clears
//! `awaiting_pong` (see [`crate::registry::Registry::touch`]) and cancels
//! the timeout.

use std::net::SocketAddrV4;
use std::sync::atomic::Ordering::Relaxed;
use std::time::Duration;

use crate::client::ClientId;
use crate::clock;
use crate::dispatch::send_one;
use crate::endpoint::Outbound;
use crate::registry::Registry;
use crate::state::{self, ServerState};
use crate::wire::Channel;

#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Idle time after which a client is pinged.
    pub inactivity_threshold: Duration,
    /// Grace period between ping and eviction.
    pub ping_timeout: Duration,
    /// Upper bound on any single sleep, so new clients are noticed promptly.
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold: Duration::from_secs(300),
            ping_timeout: Duration::from_secs(10),
            interval: Duration::from_millis(500),
        }
    }
}

/// What one sweep pass should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    Sleep(Duration),
    Ping(ClientId),
    Evict(ClientId),
}

/// Decide the next action from the current registry state. Pure in
/// `now_ms`, so timeout paths are testable without sleeping.
pub fn next_action(reg: &Registry, cfg: &SweepConfig, now_ms: u64) -> SweepAction {
    let Some(id) = reg.stalest() else {
        return SweepAction::Sleep(cfg.interval);
    };
    let Some(c) = reg.client(id) else {
        return SweepAction::Sleep(cfg.interval);
    };

    let threshold = cfg.inactivity_threshold.as_millis() as u64;
    let idle = now_ms.saturating_sub(c.last_active);
    if idle < threshold {
        // Sleep exactly until the oldest client crosses the threshold
        let wait = Duration::from_millis(threshold - idle).min(cfg.interval);
        return SweepAction::Sleep(wait);
    }

    if !c.awaiting_pong {
        return SweepAction::Ping(id);
    }

    let timeout = cfg.ping_timeout.as_millis() as u64;
    let since_ping = now_ms.saturating_sub(c.last_ping_sent);
    if since_ping >= timeout {
        SweepAction::Evict(id)
    } else {
        SweepAction::Sleep(Duration::from_millis(timeout - since_ping).min(cfg.interval))
    }
}

enum Outcome {
    Sleep(Duration),
    Ping(SocketAddrV4),
    Evict {
        name: String,
        addr: SocketAddrV4,
        peers: Vec<SocketAddrV4>,
    },
}

/// Run the sweep loop forever. Spawn on its own thread.
pub fn run(state: &ServerState, out: &dyn Outbound, cfg: &SweepConfig) {
    tracing::info!(
        threshold_secs = cfg.inactivity_threshold.as_secs(),
        ping_timeout_secs = cfg.ping_timeout.as_secs(),
        "liveness sweeper started"
    );
    loop {
        let now = clock::now_ms();
        let outcome = {
            let mut reg = state.clients_write();
            match next_action(&reg, cfg, now) {
                SweepAction::Sleep(d) => Outcome::Sleep(d),
                SweepAction::Ping(id) => {
                    reg.mark_pinged(id, now);
                    match reg.client(id) {
                        Some(c) => Outcome::Ping(c.addr),
                        None => Outcome::Sleep(cfg.interval),
                    }
                }
                SweepAction::Evict(id) => {
                    let mut rooms = state.rooms_lock();
                    match state::remove_client(&mut reg, &mut rooms, id) {
                        Some(victim) => {
                            drop(rooms);
                            let peers = reg.iter().map(|(_, c)| c.addr).collect();
                            Outcome::Evict {
                                name: victim.name,
                                addr: victim.addr,
                                peers,
                            }
                        }
                        None => Outcome::Sleep(cfg.interval),
                    }
                }
            }
        };

        match outcome {
            Outcome::Sleep(d) => std::thread::sleep(d),
            Outcome::Ping(addr) => {
                send_one(out, &state.stats, addr, Channel::Global, "ping$");
                state.stats.pings_sent.fetch_add(1, Relaxed);
                std::thread::sleep(cfg.interval);
            }
            Outcome::Evict { name, addr, peers } => {
                state.stats.evictions.fetch_add(1, Relaxed);
                tracing::info!(client = %name, "evicting inactive client");
                send_one(
                    out,
                    &state.stats,
                    addr,
                    Channel::Global,
                    "[Server] Disconnected due to inactivity.",
                );
                let msg = format!("[Server] {name} was disconnected due to inactivity");
                for peer in peers {
                    send_one(out, &state.stats, peer, Channel::Global, &msg);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddrV4;

    fn addr(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new([127, 0, 0, 1].into(), port)
    }

    fn cfg() -> SweepConfig {
        SweepConfig {
            inactivity_threshold: Duration::from_millis(300_000),
            ping_timeout: Duration::from_millis(10_000),
            interval: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_empty_registry_sleeps_default_interval() {
        let reg = Registry::new();
        assert_eq!(next_action(&reg, &cfg(), 1_000), SweepAction::Sleep(Duration::from_millis(500)));
    }

    #[test]
    fn test_fresh_client_sleeps_capped() {
        let mut reg = Registry::new();
        reg.add(addr(40001), "alice", 1_000).unwrap();
        // 299.5s until the threshold — capped at the default interval
        assert_eq!(
            next_action(&reg, &cfg(), 1_500),
            SweepAction::Sleep(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_sleep_shortens_near_threshold() {
        let mut reg = Registry::new();
        reg.add(addr(40001), "alice", 1_000).unwrap();
        // 100ms short of the threshold: sleep exactly that long
        assert_eq!(
            next_action(&reg, &cfg(), 300_900),
            SweepAction::Sleep(Duration::from_millis(100))
        );
    }

    #[test]
    fn test_stale_client_is_pinged_then_evicted() {
        let mut reg = Registry::new();
        let alice = reg.add(addr(40001), "alice", 0).unwrap();
        assert_eq!(next_action(&reg, &cfg(), 300_000), SweepAction::Ping(alice));

        reg.mark_pinged(alice, 300_000);
        // Within the grace period: wait for the pong deadline, capped
        assert_eq!(
            next_action(&reg, &cfg(), 309_800),
            SweepAction::Sleep(Duration::from_millis(200))
        );
        // Deadline passed
        assert_eq!(next_action(&reg, &cfg(), 310_000), SweepAction::Evict(alice));
    }

    #[test]
    fn test_pong_cancels_eviction() {
        let mut reg = Registry::new();
        let alice = reg.add(addr(40001), "alice", 0).unwrap();
        reg.mark_pinged(alice, 300_000);
        // Any activity clears the pending ping
        reg.touch(alice, 305_000);
        assert_eq!(
            next_action(&reg, &cfg(), 310_000),
            SweepAction::Sleep(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_sweeper_targets_the_stalest_client() {
        let mut reg = Registry::new();
        let old = reg.add(addr(40001), "old", 0).unwrap();
        reg.add(addr(40002), "fresh", 299_000).unwrap();
        assert_eq!(next_action(&reg, &cfg(), 300_000), SweepAction::Ping(old));
    }
}
