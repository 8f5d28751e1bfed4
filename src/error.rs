//! Error types shared across the crate.

use std::io;
use std::path::PathBuf;

use crate::server::ConnectionId;

/// A message from a client that could not be understood.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The text is not JSON, or lacks the `event_type` / `args` fields.
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    /// A required argument for the event is absent.
    #[error("missing argument `{argument}` for `{event_type}`")]
    MissingArgument {
        event_type: String,
        argument: &'static str,
    },

    /// A required argument is present but has the wrong shape.
    #[error("invalid argument `{argument}` for `{event_type}`")]
    InvalidArgument {
        event_type: String,
        argument: &'static str,
    },
}

/// Game rule violations. These are reported back to the offending
/// connection as an `error` event and never affect anyone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("already registered")]
    AlreadyRegistered,
    #[error("the game is not accepting new players")]
    RegistrationClosed,
    #[error("not registered")]
    NotRegistered,
    #[error("No question is being asked at the moment")]
    NoActiveQuestion,
}

/// The outbound queue of a connection is gone (its writer has stopped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("channel of connection {0} is closed")]
pub struct ChannelFailure(pub ConnectionId);

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level error for running the server.
#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
