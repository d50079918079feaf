//! chatterd — connectionless multi-user UDP chat server.
//!
//! One datagram carries one `cmd$args` command: global broadcast, direct
//! messages, named rooms, mute lists, admin moderation, and automatic
//! eviction of silent clients. Run `chatterd --help` for usage.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod serve;
mod status;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    // Load config (except for `init` which doesn't need it)
    let config = match &cli.command {
        Commands::Init => None,
        _ => {
            if !cli.config.exists() {
                std::fs::write(&cli.config, b"")?;
                eprintln!(
                    "Created '{}' — edit it or keep the defaults.",
                    cli.config.display()
                );
            }
            Some(config::ChatConfig::load(&cli.config)?)
        }
    };

    match cli.command {
        Commands::Init => {
            let example = config::ChatConfig::default_example();
            print!("{}", toml::to_string_pretty(&example)?);
        }
        Commands::Serve { port } => {
            serve::run(config.as_ref().unwrap(), port)?;
        }
        Commands::Status => {
            status::run(config.as_ref().unwrap())?;
        }
    }

    Ok(())
}
