//! Engine telemetry for observability.
//!
//! Scheduler passes, tile loads and geometry creation report into a shared
//! [`EngineMetrics`] built on lock-free atomic counters, so recording costs a
//! handful of relaxed atomic adds on the hot path.
//!
//! # Architecture
//!
//! ```text
//! Scheduler / Loaders ─────► EngineMetrics ─────► TelemetrySnapshot ─────► Views
//!                           (atomic counters)     (point-in-time copy)     (CLI, logs)
//! ```
//!
//! # Example
//!
//! ```
//! use tilecore::telemetry::EngineMetrics;
//! use std::time::Duration;
//!
//! let metrics = EngineMetrics::new();
//! metrics.task_added();
//! metrics.task_executed();
//! metrics.geometry_created(Duration::from_millis(3));
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.tasks_executed, 1);
//! assert_eq!(snapshot.geometry_created, 1);
//! ```

mod metrics;
mod snapshot;

pub use metrics::EngineMetrics;
pub use snapshot::TelemetrySnapshot;
