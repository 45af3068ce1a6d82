//! Per-group priority queues.
//!
//! Each [`TaskGroup`] has its own queue kept in ascending priority order
//! (lower values first), FIFO within equal priorities. Because task
//! priorities can drift while they wait, [`TaskQueue::update`] re-reads every
//! priority and re-sorts, after purging expired tasks.
//!
//! The queue is not thread-safe; the scheduler wraps it in a mutex.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;

use super::task::{Task, TaskGroup};

/// A task waiting in the queue.
pub struct QueuedTask {
    task: Box<dyn Task>,
    /// Priority as of the last insert or update.
    priority: f64,
    /// Insertion order, for FIFO among equal priorities.
    sequence: u64,
}

impl QueuedTask {
    fn ordering(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then(self.sequence.cmp(&other.sequence))
    }

    /// Priority as of the last sort.
    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// The wrapped task.
    pub fn task(&self) -> &dyn Task {
        self.task.as_ref()
    }
}

impl fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedTask")
            .field("name", &self.task.name())
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Priority queues for every task group.
#[derive(Default)]
pub struct TaskQueue {
    create: VecDeque<QueuedTask>,
    fetch_and_decode: VecDeque<QueuedTask>,
    next_sequence: u64,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self, group: TaskGroup) -> &VecDeque<QueuedTask> {
        match group {
            TaskGroup::Create => &self.create,
            TaskGroup::FetchAndDecode => &self.fetch_and_decode,
        }
    }

    fn group_mut(&mut self, group: TaskGroup) -> &mut VecDeque<QueuedTask> {
        match group {
            TaskGroup::Create => &mut self.create,
            TaskGroup::FetchAndDecode => &mut self.fetch_and_decode,
        }
    }

    /// Insert a task at its priority position within its group.
    pub fn push(&mut self, task: Box<dyn Task>) {
        let queued = QueuedTask {
            priority: task.priority(),
            sequence: self.next_sequence,
            task,
        };
        self.next_sequence += 1;

        let queue = self.group_mut(queued.task.group());
        let position = queue.partition_point(|t| t.ordering(&queued) == Ordering::Less);
        queue.insert(position, queued);
    }

    /// Drop expired tasks and re-sort every group by current priority.
    ///
    /// Returns the number of tasks removed.
    pub fn update(&mut self) -> usize {
        let mut removed = 0;
        for group in TaskGroup::DRAIN_ORDER {
            let queue = self.group_mut(group);
            let before = queue.len();
            queue.retain(|t| !t.task.is_expired());
            removed += before - queue.len();

            for queued in queue.iter_mut() {
                queued.priority = queued.task.priority();
            }
            queue.make_contiguous().sort_by(|a, b| a.ordering(b));
        }
        removed
    }

    /// The group the next task should come from: `Create` if it has work,
    /// else `FetchAndDecode`, else `None`.
    pub fn next_group(&self) -> Option<TaskGroup> {
        TaskGroup::DRAIN_ORDER
            .into_iter()
            .find(|group| !self.group(*group).is_empty())
    }

    /// The next task of `group` without removing it.
    pub fn peek(&self, group: TaskGroup) -> Option<&QueuedTask> {
        self.group(group).front()
    }

    /// Remove and return the next task of `group`.
    pub fn pop(&mut self, group: TaskGroup) -> Option<Box<dyn Task>> {
        self.group_mut(group).pop_front().map(|queued| queued.task)
    }

    /// Number of tasks in `group`.
    pub fn len_of(&self, group: TaskGroup) -> usize {
        self.group(group).len()
    }

    /// Number of tasks in all groups.
    pub fn len(&self) -> usize {
        self.create.len() + self.fetch_and_decode.len()
    }

    /// True if no group holds work.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every task without running it. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.len();
        self.create.clear();
        self.fetch_and_decode.clear();
        dropped
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("create", &self.create.len())
            .field("fetch_and_decode", &self.fetch_and_decode.len())
            .finish()
    }
}
