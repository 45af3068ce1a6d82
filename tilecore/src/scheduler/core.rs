//! The shared task scheduler.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace};

use super::budget::{remaining_frame_ms, BudgetTracker};
use super::queue::TaskQueue;
use super::task::{Task, TaskGroup};
use super::updater::RenderUpdater;
use crate::config::{normalize_max_fps, SchedulerConfig};
use crate::telemetry::EngineMetrics;

// =============================================================================
// Drain Report
// =============================================================================

/// Outcome of one scheduling pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrainReport {
    /// Tasks that ran.
    pub executed: usize,
    /// Tasks dropped because they expired.
    pub expired: usize,
    /// Tasks still queued after the pass.
    pub remaining: usize,
    /// Budget the pass started with; `None` when throttling was disabled.
    pub budget_ms: Option<f64>,
    /// Whether another frame was requested to continue the work.
    pub follow_up_requested: bool,
}

// =============================================================================
// Task Scheduler
// =============================================================================

/// Cross-tile task scheduler.
///
/// Owned by the rendering context and shared with every tile through an
/// `Arc`. All queue mutation happens under an internal lock that is released
/// before a task executes, so a running task may add or cancel other work.
pub struct TaskScheduler {
    config: RwLock<SchedulerConfig>,
    queue: Mutex<TaskQueue>,
    updater: Arc<dyn RenderUpdater>,
    metrics: Arc<EngineMetrics>,
}

impl TaskScheduler {
    /// Create a scheduler with its own metrics.
    pub fn new(config: SchedulerConfig, updater: Arc<dyn RenderUpdater>) -> Self {
        Self::with_metrics(config, updater, Arc::new(EngineMetrics::new()))
    }

    /// Create a scheduler that reports into existing metrics.
    pub fn with_metrics(
        config: SchedulerConfig,
        updater: Arc<dyn RenderUpdater>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let config = SchedulerConfig {
            max_fps: normalize_max_fps(config.max_fps),
            ..config
        };
        Self {
            config: RwLock::new(config),
            queue: Mutex::new(TaskQueue::new()),
            updater,
            metrics,
        }
    }

    /// Admit a task into its group.
    pub fn add(&self, task: Box<dyn Task>) {
        trace!(
            task = task.name(),
            group = %task.group(),
            priority = task.priority(),
            "Task added"
        );
        self.queue.lock().push(task);
        self.metrics.task_added();
    }

    /// Run pending work for the frame that started at `frame_start`.
    ///
    /// With throttling disabled every queued task runs. Otherwise the pass is
    /// bounded by the time left in the frame; see [`Self::process_with_budget`].
    pub fn process_pending(&self, frame_start: Instant) -> DrainReport {
        let config = self.config();
        if !config.throttling_enabled {
            return self.drain_all();
        }
        let budget_ms = remaining_frame_ms(&config, frame_start, Instant::now());
        self.process_with_budget(budget_ms)
    }

    /// Budgeted pass with an explicit budget in milliseconds.
    ///
    /// Runs `Create` tasks before `FetchAndDecode` tasks, charging each task's
    /// estimate (or the configured default) against the budget. The first
    /// task always runs. If work remains afterwards a render update is
    /// requested so the next frame continues.
    pub fn process_with_budget(&self, budget_ms: f64) -> DrainReport {
        let default_cost = self.config.read().default_task_cost_ms;
        let mut expired = self.purge_expired();
        let mut budget = BudgetTracker::new(budget_ms);

        loop {
            let next = {
                let mut queue = self.queue.lock();
                let Some(group) = queue.next_group() else {
                    break;
                };
                let Some(head) = queue.peek(group) else {
                    break;
                };
                if head.task().is_expired() {
                    queue.pop(group);
                    expired += 1;
                    self.metrics.tasks_expired(1);
                    continue;
                }
                let cost = head.task().estimated_process_time().unwrap_or(default_cost);
                if !budget.admits(cost) {
                    break;
                }
                queue.pop(group).map(|task| (task, cost))
            };
            let Some((task, cost)) = next else {
                break;
            };

            budget.charge(cost);
            self.run(task);
        }

        let remaining = self.pending_count();
        let follow_up_requested = remaining > 0;
        if follow_up_requested {
            self.metrics.follow_up_requested();
            self.updater.request_update();
        }
        self.metrics.pass_completed();

        let report = DrainReport {
            executed: budget.executed(),
            expired,
            remaining,
            budget_ms: Some(budget_ms),
            follow_up_requested,
        };
        if report.executed > 0 || report.expired > 0 {
            debug!(
                executed = report.executed,
                expired = report.expired,
                remaining = report.remaining,
                budget_ms = format!("{:.2}", budget_ms),
                left_ms = format!("{:.2}", budget.remaining_ms()),
                "Scheduler pass"
            );
        }
        report
    }

    /// Unthrottled pass: every `Create` task, then every `FetchAndDecode`
    /// task.
    pub fn drain_all(&self) -> DrainReport {
        let mut expired = self.purge_expired();
        let mut executed = 0;

        for group in TaskGroup::DRAIN_ORDER {
            loop {
                let next = self.queue.lock().pop(group);
                let Some(task) = next else {
                    break;
                };
                if task.is_expired() {
                    expired += 1;
                    self.metrics.tasks_expired(1);
                    continue;
                }
                self.run(task);
                executed += 1;
            }
        }
        self.metrics.pass_completed();

        let report = DrainReport {
            executed,
            expired,
            remaining: self.pending_count(),
            budget_ms: None,
            follow_up_requested: false,
        };
        if report.executed > 0 || report.expired > 0 {
            debug!(
                executed = report.executed,
                expired = report.expired,
                remaining = report.remaining,
                "Scheduler pass (unthrottled)"
            );
        }
        report
    }

    fn purge_expired(&self) -> usize {
        let expired = self.queue.lock().update();
        if expired > 0 {
            trace!(expired, "Purged expired tasks");
            self.metrics.tasks_expired(expired);
        }
        expired
    }

    fn run(&self, task: Box<dyn Task>) {
        trace!(task = task.name(), group = %task.group(), "Executing task");
        task.execute();
        self.metrics.task_executed();
    }

    /// Drop every pending task without running it.
    pub fn clear(&self) -> usize {
        let dropped = self.queue.lock().clear();
        if dropped > 0 {
            debug!(dropped, "Scheduler cleared");
        }
        dropped
    }

    /// Number of queued tasks across all groups.
    pub fn pending_count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Number of queued tasks in `group`.
    pub fn group_len(&self, group: TaskGroup) -> usize {
        self.queue.lock().len_of(group)
    }

    /// Current configuration.
    pub fn config(&self) -> SchedulerConfig {
        self.config.read().clone()
    }

    /// Change the frame rate target. Values `<= 0` restore the default.
    pub fn set_max_fps(&self, max_fps: f64) {
        let max_fps = normalize_max_fps(max_fps);
        self.config.write().max_fps = max_fps;
        info!(max_fps, "Scheduler frame rate updated");
    }

    /// Current frame rate target.
    pub fn max_fps(&self) -> f64 {
        self.config.read().max_fps
    }

    /// Switch between budgeted and drain-everything passes.
    pub fn set_throttling_enabled(&self, enabled: bool) {
        self.config.write().throttling_enabled = enabled;
        info!(enabled, "Scheduler throttling updated");
    }

    /// Whether passes are budgeted.
    pub fn throttling_enabled(&self) -> bool {
        self.config.read().throttling_enabled
    }

    /// Metrics this scheduler reports into.
    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Updater used for follow-up frames.
    pub fn updater(&self) -> &Arc<dyn RenderUpdater> {
        &self.updater
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("config", &*self.config.read())
            .field("queue", &*self.queue.lock())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
