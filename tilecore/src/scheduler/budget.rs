//! Frame budget accounting.

use std::time::Instant;

use crate::config::SchedulerConfig;

/// Milliseconds left in the frame that started at `frame_start`.
///
/// Computed as `max(0, 1000 / max_fps - elapsed)` minus the safety margin,
/// never below zero.
pub fn remaining_frame_ms(config: &SchedulerConfig, frame_start: Instant, now: Instant) -> f64 {
    let elapsed_ms = now.saturating_duration_since(frame_start).as_secs_f64() * 1000.0;
    let available = (config.frame_duration_ms() - elapsed_ms).max(0.0);
    (available - config.safety_margin_ms).max(0.0)
}

/// Tracks budget consumption during one scheduling pass.
///
/// The first task of a pass is always admitted, whatever its cost, so one
/// expensive task cannot starve forever. After that a task is admitted only
/// while budget remains and its estimate fits in what is left.
#[derive(Clone, Debug)]
pub struct BudgetTracker {
    remaining_ms: f64,
    executed: usize,
}

impl BudgetTracker {
    /// Start a pass with `budget_ms` available.
    pub fn new(budget_ms: f64) -> Self {
        Self {
            remaining_ms: budget_ms.max(0.0),
            executed: 0,
        }
    }

    /// Whether a task estimated at `cost_ms` may run now.
    pub fn admits(&self, cost_ms: f64) -> bool {
        self.executed == 0 || (self.remaining_ms > 0.0 && cost_ms <= self.remaining_ms)
    }

    /// Record that a task estimated at `cost_ms` ran.
    pub fn charge(&mut self, cost_ms: f64) {
        self.remaining_ms -= cost_ms.max(0.0);
        self.executed += 1;
    }

    /// Budget left; negative once the mandatory first task overran it.
    pub fn remaining_ms(&self) -> f64 {
        self.remaining_ms
    }

    /// Tasks charged so far.
    pub fn executed(&self) -> usize {
        self.executed
    }
}
