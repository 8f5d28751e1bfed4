//! Quiz server module.
//!
//! The session engine ([`Game`]), per-connection protocol handling
//! ([`Connection`]) and the WebSocket front-end around them.

mod commands;
mod connection;
pub mod hooks;
mod scoring;
mod server;
mod state;

pub use commands::{Command, CommandResult, execute_command, parse_command};
pub use connection::Connection;
pub use hooks::{ChannelHooks, GameEvent, GameHooks, LoggingHooks};
pub use scoring::{FULL_BONUS_WINDOW, Reward, bonus_multiplier};
pub use server::{SHUTDOWN_REASON, run};
pub use state::{
    ConnectionId, Game, GuessOutcome, GuessRejected, Outbound, OutboundReceiver, OutboundSender,
    Status,
};
