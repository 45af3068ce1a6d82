//! Units of work admitted to the scheduler.
//!
//! A task is a one-shot closure plus the metadata the scheduler needs to
//! order and budget it. Priority and expiry are queried at selection time,
//! not at enqueue time, because both usually depend on state that changes
//! while the task waits (a tile's on-screen area, a loader's state).

use std::fmt;

/// Category of work. `Create` is always drained before `FetchAndDecode`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskGroup {
    /// Fetching and decoding raw tile data.
    FetchAndDecode,
    /// Building geometry from decoded data.
    Create,
}

impl TaskGroup {
    /// Groups in drain order.
    pub const DRAIN_ORDER: [TaskGroup; 2] = [TaskGroup::Create, TaskGroup::FetchAndDecode];

    /// Short name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskGroup::FetchAndDecode => "fetch_and_decode",
            TaskGroup::Create => "create",
        }
    }
}

impl fmt::Display for TaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A schedulable unit of work.
///
/// Lower [`priority`](Task::priority) values run sooner. Tiles typically use
/// their negated estimated screen area so that larger, closer tiles win.
pub trait Task: Send {
    /// Name used in trace output.
    fn name(&self) -> &str {
        "task"
    }

    /// Group this task belongs to.
    fn group(&self) -> TaskGroup;

    /// Current priority. Re-read before every selection pass.
    fn priority(&self) -> f64;

    /// True if the task no longer needs to run. Expired tasks are dropped
    /// without executing.
    fn is_expired(&self) -> bool {
        false
    }

    /// Estimated run time in milliseconds, or `None` to use the scheduler's
    /// default cost.
    fn estimated_process_time(&self) -> Option<f64> {
        None
    }

    /// Run the task. Tasks handle their own errors.
    fn execute(self: Box<Self>);
}

type PriorityFn = Box<dyn Fn() -> f64 + Send>;
type ExpiryFn = Box<dyn Fn() -> bool + Send>;

/// Closure-backed [`Task`].
///
/// # Example
///
/// ```
/// use tilecore::scheduler::{FnTask, Task, TaskGroup};
///
/// let task = FnTask::new(TaskGroup::FetchAndDecode, || println!("decoding"))
///     .with_name("decode 14/8800/5372")
///     .with_priority(-1200.0)
///     .with_estimate(3.5);
///
/// assert_eq!(task.group(), TaskGroup::FetchAndDecode);
/// assert_eq!(task.priority(), -1200.0);
/// ```
pub struct FnTask {
    name: String,
    group: TaskGroup,
    run: Box<dyn FnOnce() + Send>,
    priority: PriorityFn,
    expired: Option<ExpiryFn>,
    estimate: Option<f64>,
}

impl FnTask {
    /// Create a task with priority `0.0` that never expires.
    pub fn new(group: TaskGroup, run: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name: group.as_str().to_string(),
            group,
            run: Box::new(run),
            priority: Box::new(|| 0.0),
            expired: None,
            estimate: None,
        }
    }

    /// Set the trace name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Use a fixed priority.
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = Box::new(move || priority);
        self
    }

    /// Compute the priority on every selection pass.
    pub fn with_priority_fn(mut self, priority: impl Fn() -> f64 + Send + 'static) -> Self {
        self.priority = Box::new(priority);
        self
    }

    /// Attach an expiry predicate.
    pub fn with_expiry(mut self, expired: impl Fn() -> bool + Send + 'static) -> Self {
        self.expired = Some(Box::new(expired));
        self
    }

    /// Set the estimated run time in milliseconds.
    pub fn with_estimate(mut self, estimate_ms: f64) -> Self {
        self.estimate = Some(estimate_ms);
        self
    }
}

impl Task for FnTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn group(&self) -> TaskGroup {
        self.group
    }

    fn priority(&self) -> f64 {
        (self.priority)()
    }

    fn is_expired(&self) -> bool {
        self.expired.as_ref().is_some_and(|expired| expired())
    }

    fn estimated_process_time(&self) -> Option<f64> {
        self.estimate
    }

    fn execute(self: Box<Self>) {
        (self.run)()
    }
}

impl fmt::Debug for FnTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("estimate", &self.estimate)
            .finish_non_exhaustive()
    }
}
