//! CLI definitions for chatterd.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(
    name = "chatterd",
    version,
    about = "Connectionless multi-user UDP chat server\n\nOne datagram, one command: global broadcast, direct messages, named rooms, moderation, and automatic eviction of silent clients.",
    long_about = None
)]
pub struct Cli {
    /// Path to chatter.toml config file
    #[clap(long, short, default_value = "chatter.toml")]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the chat server (Ctrl-C to stop)
    Serve {
        /// Listen port (overrides the config file)
        #[clap(long)]
        port: Option<u16>,
    },

    /// Show the most recent stats snapshot from the running server's log
    Status,

    /// Print an example chatter.toml to stdout
    Init,
}
