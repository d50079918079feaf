//! `chatterd status` — show the most recent snapshot from the stats log.
//!
//! Reads the last line of the JSONL log written by `chatterd serve` and
//! prints a static one-shot table. Use this to check on a running server
//! without attaching a client.

use anyhow::Result;
use chrono::{TimeZone, Utc};

use crate::config::ChatConfig;

pub fn run(config: &ChatConfig) -> Result<()> {
    let content = match std::fs::read_to_string(&config.stats_log) {
        Ok(c) => c,
        Err(_) => {
            eprintln!("No stats log found at {}.", config.stats_log);
            eprintln!("Start the server first:  chatterd serve");
            return Ok(());
        }
    };

    let line = match content.lines().filter(|l| !l.is_empty()).last() {
        Some(l) => l,
        None => {
            eprintln!("Stats log is empty — the server may just be starting.");
            return Ok(());
        }
    };

    let entry: serde_json::Value = serde_json::from_str(line)?;
    let ts = entry["ts"].as_u64().unwrap_or(0) as i64;
    let time_str = Utc
        .timestamp_opt(ts, 0)
        .single()
        .map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".into());

    let started_at = entry["started_at"].as_u64().unwrap_or(0) as i64;
    let uptime_str = if started_at > 0 {
        let secs = (ts - started_at).max(0) as u64;
        let h = secs / 3600;
        let m = (secs % 3600) / 60;
        let s = secs % 60;
        if h > 0 {
            format!("{}h {}m {}s", h, m, s)
        } else if m > 0 {
            format!("{}m {}s", m, s)
        } else {
            format!("{}s", s)
        }
    } else {
        "—".into()
    };

    let count = |key: &str| entry[key].as_u64().unwrap_or(0);

    println!("chatterd status — snapshot at {time_str} (up {uptime_str})");
    println!();
    println!("  active clients     {:>10}", count("active_clients"));
    println!("  active rooms       {:>10}", count("active_rooms"));
    println!();
    println!("  datagrams received {:>10}", count("datagrams_received"));
    println!("  malformed dropped  {:>10}", count("datagrams_malformed"));
    println!("  commands handled   {:>10}", count("commands_handled"));
    println!();
    println!("  global messages    {:>10}", count("messages_global"));
    println!("  room messages      {:>10}", count("messages_room"));
    println!("  private messages   {:>10}", count("messages_private"));
    println!();
    println!("  connects           {:>10}", count("connects"));
    println!("  disconnects        {:>10}", count("disconnects"));
    println!("  kicks              {:>10}", count("kicks"));
    println!("  pings sent         {:>10}", count("pings_sent"));
    println!("  evictions          {:>10}", count("evictions"));
    println!("  failed sends       {:>10}", count("sends_failed"));

    Ok(())
}
