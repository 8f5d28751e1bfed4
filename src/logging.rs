//! Logging setup.

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSettings;
use crate::error::QuizError;

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn setup_logging(settings: &LoggingSettings) -> Result<(), QuizError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| QuizError::Logging(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if settings.json_format {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| QuizError::Logging(e.to_string()))?;

    info!("Logging initialized with level: {}", settings.level);
    Ok(())
}
