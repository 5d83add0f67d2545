//! Tick-driven deadline scheduler
//!
//! Timers (reload completion, prediction expiry) are plain `(deadline, task)`
//! pairs polled once per update. Nothing here blocks or owns a clock.

use crate::time::Timestamp;

/// Identifier of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

#[derive(Debug, Clone)]
struct Scheduled<T> {
    id: TaskId,
    deadline: Timestamp,
    task: T,
}

/// Deadline list for one owner
#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    next_id: u64,
    tasks: Vec<Scheduled<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            tasks: Vec::new(),
        }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to fire at `deadline`
    pub fn schedule(&mut self, deadline: Timestamp, task: T) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        self.tasks.push(Scheduled { id, deadline, task });
        id
    }

    /// Remove a pending task; returns it if it was still pending
    pub fn cancel(&mut self, id: TaskId) -> Option<T> {
        let pos = self.tasks.iter().position(|s| s.id == id)?;
        Some(self.tasks.remove(pos).task)
    }

    /// Remove every pending task matching `pred`
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|s| !pred(&s.task));
        before - self.tasks.len()
    }

    /// Take all tasks due at `now`, earliest deadline first
    ///
    /// Tasks with equal deadlines fire in scheduling order.
    pub fn poll(&mut self, now: Timestamp) -> Vec<T> {
        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|s| s.deadline <= now);
        self.tasks = pending;
        due.sort_by(|a, b| {
            a.deadline
                .as_secs()
                .total_cmp(&b.deadline.as_secs())
                .then(a.id.cmp(&b.id))
        });
        due.into_iter().map(|s| s.task).collect()
    }

    /// Deadline of a pending task
    pub fn deadline(&self, id: TaskId) -> Option<Timestamp> {
        self.tasks.iter().find(|s| s.id == id).map(|s| s.deadline)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}
