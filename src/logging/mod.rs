//! Logging subsystem
//!
//! Structured logging via tracing with JSON (production) and plaintext
//! (development) output formats.
//!
//! # Environment Variables
//!
//! - `RELAYBOT_LOG` - Primary log level/filter (takes precedence)
//! - `RUST_LOG` - Fallback log level/filter

pub mod audit;

use std::io;
use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Guard to track if logging has been initialized
static INIT_GUARD: OnceLock<()> = OnceLock::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON format for production (structured logs)
    Json,
    /// Human-readable plaintext for development
    #[default]
    Plaintext,
}

/// Configuration for the logging subsystem
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format (JSON or plaintext)
    pub format: LogFormat,
    /// Default log level when no env filter is set
    pub default_level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Plaintext,
            default_level: Level::INFO,
        }
    }
}

impl LogConfig {
    /// Create a development configuration (plaintext, debug level)
    pub fn development() -> Self {
        Self {
            format: LogFormat::Plaintext,
            default_level: Level::DEBUG,
        }
    }

    /// Create a production configuration (JSON, info level)
    pub fn production() -> Self {
        Self {
            format: LogFormat::Json,
            default_level: Level::INFO,
        }
    }
}

/// Error type for logging initialization
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to parse log filter: {0}")]
    FilterParse(#[from] tracing_subscriber::filter::ParseError),
    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Build an EnvFilter from environment variables or default level.
///
/// Checks RELAYBOT_LOG first, then RUST_LOG, falling back to the default
/// level with the noisy HTTP internals capped at warn.
fn build_env_filter(default_level: Level) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = std::env::var("RELAYBOT_LOG") {
        return Ok(EnvFilter::try_new(filter)?);
    }
    if let Ok(filter) = std::env::var("RUST_LOG") {
        return Ok(EnvFilter::try_new(filter)?);
    }

    let default_filter = format!(
        "{level},hyper=warn,reqwest=warn,rustls=warn",
        level = default_level.as_str().to_lowercase()
    );
    Ok(EnvFilter::try_new(default_filter)?)
}

/// Initialize the logging subsystem with the given configuration.
///
/// This function should be called once at application startup. Subsequent
/// calls return an error.
pub fn init_logging(config: LogConfig) -> Result<(), LoggingError> {
    if INIT_GUARD.set(()).is_err() {
        return Err(LoggingError::AlreadyInitialized);
    }

    let filter = build_env_filter(config.default_level)?;
    let timer = UtcTime::rfc_3339();

    match config.format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_timer(timer)
                .with_target(true)
                .with_writer(io::stdout)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).init();
        }
        LogFormat::Plaintext => {
            let layer = tracing_subscriber::fmt::layer()
                .with_timer(timer)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_writer(io::stdout)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).init();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_plaintext_info() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Plaintext);
        assert_eq!(config.default_level, Level::INFO);
    }

    #[test]
    fn test_production_config_is_json_info() {
        let config = LogConfig::production();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.default_level, Level::INFO);
    }

    #[test]
    fn test_development_config_is_plaintext_debug() {
        let config = LogConfig::development();
        assert_eq!(config.format, LogFormat::Plaintext);
        assert_eq!(config.default_level, Level::DEBUG);
    }

    #[test]
    fn test_build_env_filter_default() {
        // Only exercises the fallback path when neither env var is set;
        // when they are set in the environment this still must parse.
        let filter = build_env_filter(Level::INFO);
        assert!(filter.is_ok());
    }
}
