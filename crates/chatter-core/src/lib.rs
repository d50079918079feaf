pub mod client;
pub mod clock;
pub mod dispatch;
pub mod endpoint;
pub mod heap;
pub mod history;
pub mod listener;
pub mod registry;
pub mod rooms;
pub mod state;
pub mod stats;
pub mod sweeper;
pub mod wire;

pub use client::{Client, ClientId};
pub use dispatch::Dispatcher;
pub use endpoint::{ChatSocket, Outbound};
pub use history::HistoryRing;
pub use registry::Registry;
pub use rooms::RoomTable;
pub use state::ServerState;
pub use stats::{ServerStats, StatsSnapshot};
pub use sweeper::SweepConfig;
pub use wire::{Channel, Command};
