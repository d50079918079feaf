//! `chatterd serve` — run the server.
//!
//! Wires the shared state, the UDP socket, the sweeper, and the stats
//! logger together, then parks the main thread in the listener loop. The
//! stats thread appends a JSONL snapshot every N seconds; `chatterd status`
//! reads the last line.

use anyhow::Result;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chatter_core::{listener, sweeper, ChatSocket, Dispatcher, ServerState, StatsSnapshot};

use crate::config::ChatConfig;

#[derive(Serialize)]
struct LogEntry {
    ts: u64,
    started_at: u64,
    #[serde(flatten)]
    stats: StatsSnapshot,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub fn run(config: &ChatConfig, port_override: Option<u16>) -> Result<()> {
    let port = port_override.unwrap_or(config.port);

    let state = Arc::new(ServerState::new());
    let socket = Arc::new(ChatSocket::bind(port)?);
    let dispatcher = Arc::new(Dispatcher::new(
        state.clone(),
        socket.clone(),
        config.admin_port,
    ));

    eprintln!(
        "chatterd serve — listening on 0.0.0.0:{}, admin port {}, {} worker(s)",
        socket.port(),
        config.admin_port,
        config.workers
    );
    eprintln!("Run `chatterd status` to check current stats.");

    let sweep_cfg = config.sweep_config();
    {
        let state = state.clone();
        let socket = socket.clone();
        std::thread::Builder::new()
            .name("chat-sweeper".into())
            .spawn(move || sweeper::run(&state, socket.as_ref(), &sweep_cfg))?;
    }

    spawn_stats_thread(
        state.clone(),
        config.stats_log.clone(),
        config.stats_interval_secs,
    )?;

    listener::run(socket, dispatcher, config.workers)
}

fn spawn_stats_thread(state: Arc<ServerState>, log_path: String, interval_secs: u64) -> Result<()> {
    // Truncate the log at startup so `status` immediately reflects this run.
    if let Ok(f) = std::fs::File::create(&log_path) {
        drop(f);
    } else {
        tracing::warn!("cannot write stats log at {log_path}; `chatterd status` will be blind");
    }

    let started_at = unix_now();
    let interval = Duration::from_secs(interval_secs.max(1));

    std::thread::Builder::new()
        .name("chat-stats".into())
        .spawn(move || loop {
            std::thread::sleep(interval);

            let (active_clients, active_rooms) = {
                let reg = state.clients_read();
                let rooms = state.rooms_lock();
                (reg.len(), rooms.len())
            };
            let entry = LogEntry {
                ts: unix_now(),
                started_at,
                stats: state.stats.snapshot(active_clients, active_rooms),
            };

            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
                if let Ok(line) = serde_json::to_string(&entry) {
                    let _ = writeln!(file, "{}", line);
                }
            }
        })?;
    Ok(())
}
