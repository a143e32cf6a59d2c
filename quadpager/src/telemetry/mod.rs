//! Scheduler telemetry for observability.
//!
//! Lock-free atomic counters updated by the tile scheduler and its daemon,
//! copied into a plain snapshot for display.
//!
//! # Architecture
//!
//! ```text
//! TileScheduler ─────► SchedulerMetrics ─────► TelemetrySnapshot ─────► Views
//! SchedulerDaemon      (atomic counters)       (point-in-time copy)     (CLI, logs)
//! ```
//!
//! # Example
//!
//! ```
//! use quadpager::telemetry::SchedulerMetrics;
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(SchedulerMetrics::new());
//!
//! metrics.fetch_started();
//! metrics.fetch_succeeded();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.fetches_started, 1);
//! assert_eq!(snapshot.in_flight(), 0);
//! ```

mod metrics;
mod snapshot;

pub use metrics::SchedulerMetrics;
pub use snapshot::TelemetrySnapshot;
