//! Reconciliation cadence control.
//!
//! View changes can arrive every frame. [`UpdateThrottle`] lets a
//! reconciliation through only when the minimum period has elapsed and, if
//! configured, the eye has moved far enough since the last pass.

use std::time::{Duration, Instant};

use glam::DVec3;

use crate::view::ViewState;

/// Time and distance gate for reconciliation passes.
#[derive(Debug, Clone)]
pub struct UpdateThrottle {
    min_period: Duration,
    min_distance: f64,
    last: Option<(Instant, DVec3)>,
}

impl UpdateThrottle {
    /// `min_distance` of zero disables the distance gate.
    pub fn new(min_period: Duration, min_distance: f64) -> Self {
        Self {
            min_period,
            min_distance,
            last: None,
        }
    }

    /// True if a pass for `view` may run at `now`.
    pub fn should_update(&self, view: &ViewState, now: Instant) -> bool {
        let Some((at, eye)) = self.last else {
            return true;
        };
        if now.saturating_duration_since(at) < self.min_period {
            return false;
        }
        self.min_distance <= 0.0 || eye.distance(view.eye_pos) >= self.min_distance
    }

    /// Time left before the period gate opens, zero if already open.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last {
            Some((at, _)) => self
                .min_period
                .saturating_sub(now.saturating_duration_since(at)),
            None => Duration::ZERO,
        }
    }

    /// Records that a pass ran for `view`.
    pub fn mark_updated(&mut self, view: &ViewState, now: Instant) {
        self.last = Some((now, view.eye_pos));
    }

    /// Forgets the last pass so the next check always succeeds.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
