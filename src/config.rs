//! `chatter.toml` configuration for chatterd.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use chatter_core::sweeper::SweepConfig;
use chatter_core::wire;

/// Top-level server configuration. Every field has a default, so an empty
/// file is a valid config.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    /// UDP port to listen on.
    #[serde(default = "ChatConfig::default_port")]
    pub port: u16,
    /// Source port that grants admin rights (`kick`, `kickroom`).
    #[serde(default = "ChatConfig::default_admin_port")]
    pub admin_port: u16,
    /// Seconds of silence before a client is pinged.
    #[serde(default = "ChatConfig::default_inactivity_threshold_secs")]
    pub inactivity_threshold_secs: u64,
    /// Seconds between ping and eviction.
    #[serde(default = "ChatConfig::default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
    /// Upper bound on any single sweeper sleep, in milliseconds.
    #[serde(default = "ChatConfig::default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Number of dispatcher worker threads.
    #[serde(default = "ChatConfig::default_workers")]
    pub workers: usize,
    /// Where `serve` writes its JSONL stats snapshots (read by `status`).
    #[serde(default = "ChatConfig::default_stats_log")]
    pub stats_log: String,
    /// Seconds between stats snapshots.
    #[serde(default = "ChatConfig::default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl ChatConfig {
    fn default_port() -> u16 { wire::DEFAULT_PORT }
    fn default_admin_port() -> u16 { wire::DEFAULT_ADMIN_PORT }
    fn default_inactivity_threshold_secs() -> u64 { 300 }
    fn default_ping_timeout_secs() -> u64 { 10 }
    fn default_sweep_interval_ms() -> u64 { 500 }
    fn default_workers() -> usize { 4 }
    fn default_stats_log() -> String { "/var/log/chatterd.jsonl".into() }
    fn default_stats_interval_secs() -> u64 { 30 }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let cfg: Self = toml::from_str(&text)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(cfg)
    }

    /// Returns the documented defaults, for `chatterd init`.
    pub fn default_example() -> Self {
        Self::default()
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            inactivity_threshold: Duration::from_secs(self.inactivity_threshold_secs),
            ping_timeout: Duration::from_secs(self.ping_timeout_secs),
            interval: Duration::from_millis(self.sweep_interval_ms),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            port: Self::default_port(),
            admin_port: Self::default_admin_port(),
            inactivity_threshold_secs: Self::default_inactivity_threshold_secs(),
            ping_timeout_secs: Self::default_ping_timeout_secs(),
            sweep_interval_ms: Self::default_sweep_interval_ms(),
            workers: Self::default_workers(),
            stats_log: Self::default_stats_log(),
            stats_interval_secs: Self::default_stats_interval_secs(),
        }
    }
}
