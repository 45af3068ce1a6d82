//! Atomic counters shared by the scheduler and the tile state machines.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::snapshot::TelemetrySnapshot;

/// Lock-free counters for scheduling and tile lifecycle events.
///
/// All counters are monotonic. Take a [`TelemetrySnapshot`] to read them.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    // Scheduler
    tasks_added: AtomicU64,
    tasks_executed: AtomicU64,
    tasks_expired: AtomicU64,
    passes: AtomicU64,
    follow_ups_requested: AtomicU64,

    // Tile loader
    loads_started: AtomicU64,
    loads_ready: AtomicU64,
    loads_failed: AtomicU64,
    loads_canceled: AtomicU64,

    // Geometry
    geometry_created: AtomicU64,
    geometry_failed: AtomicU64,
    geometry_canceled: AtomicU64,
    geometry_time_us: AtomicU64,

    // Tiles
    tiles_disposed: AtomicU64,
}

impl EngineMetrics {
    /// Create a new set of zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// A task was admitted to the scheduler.
    pub fn task_added(&self) {
        self.tasks_added.fetch_add(1, Ordering::Relaxed);
    }

    /// A task ran.
    pub fn task_executed(&self) {
        self.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Expired tasks were purged from the queue.
    pub fn tasks_expired(&self, count: usize) {
        self.tasks_expired
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// A scheduling pass completed.
    pub fn pass_completed(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    /// A pass ran out of budget with work remaining.
    pub fn follow_up_requested(&self) {
        self.follow_ups_requested.fetch_add(1, Ordering::Relaxed);
    }

    /// A tile load was started.
    pub fn load_started(&self) {
        self.loads_started.fetch_add(1, Ordering::Relaxed);
    }

    /// A tile load reached `Ready`.
    pub fn load_ready(&self) {
        self.loads_ready.fetch_add(1, Ordering::Relaxed);
    }

    /// A tile load failed.
    pub fn load_failed(&self) {
        self.loads_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A tile load was canceled.
    pub fn load_canceled(&self) {
        self.loads_canceled.fetch_add(1, Ordering::Relaxed);
    }

    /// Geometry was built for a tile in `elapsed`.
    pub fn geometry_created(&self, elapsed: Duration) {
        self.geometry_created.fetch_add(1, Ordering::Relaxed);
        self.geometry_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// The geometry creation routine returned an error.
    pub fn geometry_failed(&self) {
        self.geometry_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Pending geometry work was canceled.
    pub fn geometry_canceled(&self) {
        self.geometry_canceled.fetch_add(1, Ordering::Relaxed);
    }

    /// A tile was disposed.
    pub fn tile_disposed(&self) {
        self.tiles_disposed.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of all counters.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let geometry_created = self.geometry_created.load(Ordering::Relaxed);
        let geometry_time_us = self.geometry_time_us.load(Ordering::Relaxed);
        let avg_geometry_ms = if geometry_created > 0 {
            geometry_time_us as f64 / geometry_created as f64 / 1000.0
        } else {
            0.0
        };

        TelemetrySnapshot {
            tasks_added: self.tasks_added.load(Ordering::Relaxed),
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            tasks_expired: self.tasks_expired.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
            follow_ups_requested: self.follow_ups_requested.load(Ordering::Relaxed),
            loads_started: self.loads_started.load(Ordering::Relaxed),
            loads_ready: self.loads_ready.load(Ordering::Relaxed),
            loads_failed: self.loads_failed.load(Ordering::Relaxed),
            loads_canceled: self.loads_canceled.load(Ordering::Relaxed),
            geometry_created,
            geometry_failed: self.geometry_failed.load(Ordering::Relaxed),
            geometry_canceled: self.geometry_canceled.load(Ordering::Relaxed),
            avg_geometry_ms,
            tiles_disposed: self.tiles_disposed.load(Ordering::Relaxed),
        }
    }
}
