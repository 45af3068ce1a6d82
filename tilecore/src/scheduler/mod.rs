//! Shared, frame-budgeted task scheduler.
//!
//! Every tile feeds units of work into one [`TaskScheduler`] owned by the
//! rendering context. Work is grouped by [`TaskGroup`]; within a group tasks
//! run in ascending priority order, and `Create` work always runs before
//! `FetchAndDecode` work because a decoded tile is closer to producing a
//! visible result.
//!
//! # Frame loop
//!
//! ```text
//! frame start ──► Tile::update (enqueue) ──► render ──► process_pending(frame_start)
//!                                                          │
//!                              ┌───────────────────────────┤
//!                              ▼                           ▼
//!                    purge expired tasks        budget = frame time left - margin
//!                                                          │
//!                                    run Create, then FetchAndDecode tasks
//!                                    until the next estimate does not fit
//!                                    (always at least one per pass)
//!                                                          │
//!                                       work left? ──► RenderUpdater::request_update
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tilecore::config::SchedulerConfig;
//! use tilecore::scheduler::{FnTask, TaskGroup, TaskScheduler, UpdateCounter};
//!
//! let updater = Arc::new(UpdateCounter::new());
//! let scheduler = TaskScheduler::new(SchedulerConfig::default(), updater.clone());
//!
//! for _ in 0..5 {
//!     scheduler.add(Box::new(FnTask::new(TaskGroup::Create, || {}).with_estimate(5.0)));
//! }
//!
//! let report = scheduler.process_with_budget(16.0);
//! assert_eq!(report.executed, 3);
//! assert_eq!(report.remaining, 2);
//! assert!(report.follow_up_requested);
//! assert_eq!(updater.count(), 1);
//! ```

mod budget;
mod core;
mod queue;
mod task;
mod updater;

pub use self::budget::{remaining_frame_ms, BudgetTracker};
pub use self::core::{DrainReport, TaskScheduler};
pub use self::queue::{QueuedTask, TaskQueue};
pub use self::task::{FnTask, Task, TaskGroup};
pub use self::updater::{NoopUpdater, RenderUpdater, UpdateCounter};
