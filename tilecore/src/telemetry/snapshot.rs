//! Point-in-time copy of the engine counters.

use std::fmt;

use serde::Serialize;

/// Snapshot of [`super::EngineMetrics`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub tasks_added: u64,
    pub tasks_executed: u64,
    pub tasks_expired: u64,
    pub passes: u64,
    pub follow_ups_requested: u64,
    pub loads_started: u64,
    pub loads_ready: u64,
    pub loads_failed: u64,
    pub loads_canceled: u64,
    pub geometry_created: u64,
    pub geometry_failed: u64,
    pub geometry_canceled: u64,
    /// Mean wall time of successful geometry creation.
    pub avg_geometry_ms: f64,
    pub tiles_disposed: u64,
}

impl TelemetrySnapshot {
    /// Loads started but not yet settled.
    pub fn loads_in_flight(&self) -> u64 {
        self.loads_started
            .saturating_sub(self.loads_ready + self.loads_failed + self.loads_canceled)
    }

    /// Tasks admitted that have neither run nor expired.
    pub fn tasks_outstanding(&self) -> u64 {
        self.tasks_added
            .saturating_sub(self.tasks_executed + self.tasks_expired)
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "tasks: {} added, {} executed, {} expired ({} passes, {} follow-ups)",
            self.tasks_added,
            self.tasks_executed,
            self.tasks_expired,
            self.passes,
            self.follow_ups_requested
        )?;
        writeln!(
            f,
            "loads: {} started, {} ready, {} failed, {} canceled",
            self.loads_started, self.loads_ready, self.loads_failed, self.loads_canceled
        )?;
        writeln!(
            f,
            "geometry: {} created (avg {:.2} ms), {} failed, {} canceled",
            self.geometry_created, self.avg_geometry_ms, self.geometry_failed, self.geometry_canceled
        )?;
        write!(f, "tiles disposed: {}", self.tiles_disposed)
    }
}
