//! Tracing subscriber installation for binaries.
//!
//! The library only emits `tracing` events. Applications call [`init`] once
//! at startup to print them to stderr and, optionally, append them to a file.
//!
//! # Example
//!
//! ```no_run
//! use quadpager::logging::{self, LoggingConfig};
//!
//! let _guard = logging::init(&LoggingConfig::default()).expect("logging");
//! tracing::info!("ready");
//! ```

use std::path::PathBuf;

use thiserror::Error;
use time::macros::format_description;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self, time::OffsetTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when neither the config nor `RUST_LOG` sets one.
pub const DEFAULT_LOG_FILTER: &str = "quadpager=info";

/// Errors from subscriber installation.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Invalid log file path: {0}")]
    InvalidPath(PathBuf),

    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

/// Where and how much to log.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Filter directives. `None` uses `RUST_LOG`, then [`DEFAULT_LOG_FILTER`].
    pub filter: Option<String>,

    /// File to append plain-text logs to.
    pub log_file: Option<PathBuf>,

    /// Colored stderr output.
    pub ansi: bool,
}

impl LoggingConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }
}

/// Builds the event filter from explicit directives, falling back to `RUST_LOG`.
pub fn build_filter(directives: Option<&str>) -> Result<EnvFilter, LoggingError> {
    match directives {
        Some(filter) => EnvFilter::try_new(filter).map_err(|e| LoggingError::InvalidFilter {
            filter: filter.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
    }
}

/// Installs the global subscriber.
///
/// Returns the file writer's guard when a log file is configured; buffered
/// lines are flushed when it drops, so hold it until exit.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = build_filter(config.filter.as_deref())?;

    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = OffsetTime::new(
        offset,
        format_description!("[hour]:[minute]:[second].[subsecond digits:3]"),
    );

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_ansi(config.ansi)
        .with_target(false);

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let name = path
                .file_name()
                .ok_or_else(|| LoggingError::InvalidPath(path.clone()))?;
            let dir = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_timer(timer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_filter() {
        assert!(build_filter(Some("quadpager=debug,tokio=warn")).is_ok());
    }

    #[test]
    fn test_invalid_filter() {
        let err = build_filter(Some("quadpager=loud"));
        assert!(matches!(err, Err(LoggingError::InvalidFilter { .. })));
    }

    #[test]
    fn test_config_builders() {
        let config = LoggingConfig::default()
            .with_filter("debug")
            .with_log_file("/tmp/quadpager.log")
            .with_ansi(true);
        assert_eq!(config.filter.as_deref(), Some("debug"));
        assert!(config.ansi);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/quadpager.log")));
    }
}
