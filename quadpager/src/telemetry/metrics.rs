use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::TelemetrySnapshot;

/// Atomic counters for the tile scheduler.
///
/// All updates use relaxed ordering. Counters are monotonic except
/// `tiles_loaded`, which tracks the current loaded-tile count.
#[derive(Debug)]
pub struct SchedulerMetrics {
    started: Instant,
    reconciliations: AtomicU64,
    fetches_started: AtomicU64,
    fetches_succeeded: AtomicU64,
    fetches_failed: AtomicU64,
    fetches_cancelled: AtomicU64,
    late_completions: AtomicU64,
    evictions: AtomicU64,
    tiles_loaded: AtomicU64,
    change_sets: AtomicU64,
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            reconciliations: AtomicU64::new(0),
            fetches_started: AtomicU64::new(0),
            fetches_succeeded: AtomicU64::new(0),
            fetches_failed: AtomicU64::new(0),
            fetches_cancelled: AtomicU64::new(0),
            late_completions: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            tiles_loaded: AtomicU64::new(0),
            change_sets: AtomicU64::new(0),
        }
    }

    pub fn reconciliation(&self) {
        self.reconciliations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_started(&self) {
        self.fetches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_succeeded(&self) {
        self.fetches_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_failed(&self) {
        self.fetches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_cancelled(&self) {
        self.fetches_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// A completion arrived for a node that was cancelled or unknown.
    pub fn late_completion(&self) {
        self.late_completions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn evicted(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_tiles_loaded(&self, count: u64) {
        self.tiles_loaded.store(count, Ordering::Relaxed);
    }

    pub fn change_set_emitted(&self) {
        self.change_sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies every counter into a snapshot.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            uptime: self.started.elapsed(),
            reconciliations: self.reconciliations.load(Ordering::Relaxed),
            fetches_started: self.fetches_started.load(Ordering::Relaxed),
            fetches_succeeded: self.fetches_succeeded.load(Ordering::Relaxed),
            fetches_failed: self.fetches_failed.load(Ordering::Relaxed),
            fetches_cancelled: self.fetches_cancelled.load(Ordering::Relaxed),
            late_completions: self.late_completions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            tiles_loaded: self.tiles_loaded.load(Ordering::Relaxed),
            change_sets: self.change_sets.load(Ordering::Relaxed),
        }
    }
}
