//! # quiz-session
//!
//! A real-time multiplayer quiz session served over WebSocket.
//!
//! One host asks questions; clients register, guess, and collect points.
//! Fast correct answers earn a bonus that decays with the time taken.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use quiz_session::config::AppConfig;
//! use quiz_session::server::{self, Game, LoggingHooks};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), quiz_session::QuizError> {
//!     let config = AppConfig::load("quiz.toml")?;
//!     let game = Arc::new(Game::with_hooks(config.game.clone(), Arc::new(LoggingHooks)));
//!
//!     // Serve clients and read host commands from stdin.
//!     server::run(&config.server, game).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod protocol;
pub mod server;

pub use error::{ChannelFailure, ConfigError, GameError, ProtocolError, QuizError};
pub use models::{Player, PlayerId};
pub use protocol::{Event, Request};
pub use server::{Connection, Game, GameHooks};
