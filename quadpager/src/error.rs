//! Error types for the paging engine.
//!
//! Failures are always local to a single tile or object. Nothing here aborts
//! a reconciliation pass: the scheduler converts fetch errors into per-node
//! state, and geometry errors prune the node from coverage.

use thiserror::Error;

/// Outcome of a failed tile fetch as reported by a fetch collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The fetch failed. The node stays eligible for a retry on the next
    /// reconciliation pass while it is still desired.
    #[error("Tile fetch failed: {0}")]
    Failed(String),

    /// The tile does not exist at the source.
    #[error("Tile not found at source")]
    NotFound,

    /// The fetch was cancelled before it completed.
    ///
    /// This is not a failure and is never surfaced to the renderer.
    #[error("Tile fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Returns true if the scheduler may retry this node later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Failed(_))
    }
}

/// Errors raised by geometry helpers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// The region has zero (or negative) area or non-finite coordinates.
    #[error("Degenerate geometry: {reason}")]
    Degenerate { reason: String },

    /// A numeric range was inverted or otherwise unusable.
    #[error("Invalid range {min}..{max}")]
    InvalidRange { min: f64, max: f64 },
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading or writing the configuration file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// A configuration value is out of range or malformed.
    #[error("Invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// An unrecognized key was found.
    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors from the scheduler daemon's public handle.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The daemon is shutting down and no longer accepts work.
    #[error("Scheduler is shutting down")]
    ShuttingDown,

    /// The daemon's channel was closed.
    #[error("Scheduler channel closed")]
    ChannelClosed,

    /// The supplied configuration is invalid.
    #[error("Invalid scheduler configuration: {0}")]
    Config(#[from] ConfigError),
}
