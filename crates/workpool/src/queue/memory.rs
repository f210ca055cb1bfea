//! In-memory implementation of TaskQueue

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::backend::{QueueError, TaskQueue};
use crate::context::Context;
use crate::task::Task;

/// In-process FIFO queue
///
/// Unbounded by default; a bounded queue rejects enqueues with
/// [`QueueError::Full`] once `capacity` tasks are waiting. Tasks are lost when
/// the process exits.
///
/// # Example
///
/// ```
/// use workpool::InMemoryTaskQueue;
///
/// let queue = InMemoryTaskQueue::with_capacity(1000);
/// assert_eq!(queue.capacity(), Some(1000));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    capacity: Option<usize>,
}

impl InMemoryTaskQueue {
    /// Create a queue with no capacity limit
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Create a queue holding at most `capacity` tasks (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            tasks: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: Some(capacity),
        }
    }

    /// Capacity limit, `None` when unbounded
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Number of waiting tasks
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Drop every waiting task, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut tasks = self.tasks.lock();
        let removed = tasks.len();
        tasks.clear();
        removed
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, _ctx: &Context, task: Task) -> Result<(), QueueError> {
        let mut tasks = self.tasks.lock();
        if self.capacity.is_some_and(|cap| tasks.len() >= cap) {
            return Err(QueueError::Full);
        }
        tasks.push_back(task);
        Ok(())
    }

    async fn dequeue(&self, _ctx: &Context) -> Result<Task, QueueError> {
        self.tasks.lock().pop_front().ok_or(QueueError::Empty)
    }
}
