//! Logging setup
//!
//! The crate logs through `tracing`; installing a subscriber is left to
//! the application. [`init_logging`] is a convenience that installs one
//! from a [`LoggingConfig`]. `RUST_LOG` takes precedence over the
//! configured level.

use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{OrmError, OrmResult};

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, for development
    Pretty,
    /// One JSON object per line, for production
    Json,
}

impl LogFormat {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Install a global subscriber built from `config`
///
/// Fails if the format is unknown, the log file can't be opened, or a
/// global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> OrmResult<()> {
    let format = LogFormat::from_str(&config.format).ok_or_else(|| {
        OrmError::Config(format!(
            "unknown log format '{}' (expected pretty or json)",
            config.format
        ))
    })?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| OrmError::Config(format!("invalid log level '{}': {}", config.level, e)))?;

    let file = match &config.file {
        Some(path) => Some(Mutex::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| OrmError::Config(format!("cannot open log file {}: {}", path, e)))?,
        )),
        None => None,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match (format, file) {
        (LogFormat::Json, Some(file)) => registry.with(fmt::layer().json().with_writer(file)).try_init(),
        (LogFormat::Json, None) => registry.with(fmt::layer().json()).try_init(),
        (LogFormat::Pretty, Some(file)) => registry
            .with(fmt::layer().with_ansi(false).with_writer(file))
            .try_init(),
        (LogFormat::Pretty, None) => registry.with(fmt::layer()).try_init(),
    };

    result.map_err(|e| OrmError::Config(format!("failed to install logger: {}", e)))
}
