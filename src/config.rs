//! Configuration loaded from a TOML file.
//!
//! Every field has a default, so an empty or missing file yields a working
//! setup. Command-line flags are applied on top by the binary.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub game: GameConfig,
    pub logging: LoggingSettings,
}

/// Network binding for the WebSocket listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Scoring rules of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Base points for a correct answer.
    pub reward_points: u64,
    /// Largest timing bonus, granted to answers within the first second.
    pub reward_bonus: u64,
    /// Decay constant of the timing bonus, in `(0, 1]`.
    pub reward_bonus_time_multiplier: f64,
    /// Whether registration is open when the session starts.
    pub accepting_new_players: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            reward_points: 500,
            reward_bonus: 700,
            reward_bonus_time_multiplier: 0.93,
            accepting_new_players: false,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = self.reward_bonus_time_multiplier;
        if !(m > 0.0 && m <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "reward_bonus_time_multiplier must be in (0, 1], got {}",
                m
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive (trace, debug, info, warn, error).
    pub level: String,
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Load the configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.game.validate()
    }
}
