use std::fmt;
use std::time::Duration;

/// Point-in-time copy of [`super::SchedulerMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub uptime: Duration,
    pub reconciliations: u64,
    pub fetches_started: u64,
    pub fetches_succeeded: u64,
    pub fetches_failed: u64,
    pub fetches_cancelled: u64,
    pub late_completions: u64,
    pub evictions: u64,
    pub tiles_loaded: u64,
    pub change_sets: u64,
}

impl TelemetrySnapshot {
    /// Fetches started but not yet finished in any way.
    pub fn in_flight(&self) -> u64 {
        self.fetches_started.saturating_sub(
            self.fetches_succeeded + self.fetches_failed + self.fetches_cancelled,
        )
    }

    /// Fraction of finished fetches that succeeded, 0.0 when none finished.
    pub fn success_rate(&self) -> f64 {
        let finished = self.fetches_succeeded + self.fetches_failed;
        if finished == 0 {
            0.0
        } else {
            self.fetches_succeeded as f64 / finished as f64
        }
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "uptime:            {:.1}s", self.uptime.as_secs_f64())?;
        writeln!(f, "reconciliations:   {}", self.reconciliations)?;
        writeln!(
            f,
            "fetches:           {} started, {} ok, {} failed, {} cancelled",
            self.fetches_started,
            self.fetches_succeeded,
            self.fetches_failed,
            self.fetches_cancelled
        )?;
        writeln!(f, "late completions:  {}", self.late_completions)?;
        writeln!(f, "evictions:         {}", self.evictions)?;
        writeln!(f, "change sets:       {}", self.change_sets)?;
        write!(f, "tiles loaded:      {}", self.tiles_loaded)
    }
}
