//! Priority merge over several queue backends

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{trace, warn};

use super::backend::{QueueError, TaskQueue};
use crate::context::Context;
use crate::task::Task;

/// A backend together with its name and priority
#[derive(Clone)]
pub struct PrioritizedQueue {
    pub name: String,
    pub priority: i32,
    pub queue: Arc<dyn TaskQueue>,
}

impl fmt::Debug for PrioritizedQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrioritizedQueue")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Several backends presented as one ordered source of work
///
/// Backends are scanned by descending priority, equal priorities by ascending
/// name. The order is fixed at construction. A scan is a point-in-time
/// snapshot: a task enqueued on a higher-priority backend after the scan
/// passed it is picked up by the next dequeue.
#[derive(Debug, Clone)]
pub struct PriorityTaskQueue {
    queues: Vec<PrioritizedQueue>,
}

impl PriorityTaskQueue {
    /// Build from an explicit list of backends
    pub fn new(mut queues: Vec<PrioritizedQueue>) -> Self {
        queues.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.name.cmp(&b.name))
        });
        Self { queues }
    }

    /// Build from a backend map and a priority map
    ///
    /// Backends without a priority entry get priority 0. Priority entries for
    /// unknown queue names are ignored.
    pub fn from_maps(
        queues: &HashMap<String, Arc<dyn TaskQueue>>,
        priorities: &HashMap<String, i32>,
    ) -> Self {
        for name in priorities.keys() {
            if !queues.contains_key(name) {
                warn!(queue = %name, "Priority configured for unknown queue, ignoring");
            }
        }

        let entries = queues
            .iter()
            .map(|(name, queue)| PrioritizedQueue {
                name: name.clone(),
                priority: priorities.get(name).copied().unwrap_or(0),
                queue: Arc::clone(queue),
            })
            .collect();

        Self::new(entries)
    }

    /// Take a task from the highest-priority non-empty backend
    ///
    /// A backend failure other than [`QueueError::Empty`] is returned at once
    /// rather than skipped. [`QueueError::Empty`] means every backend was empty.
    pub async fn dequeue(&self, ctx: &Context) -> Result<Task, QueueError> {
        self.dequeue_with_source(ctx).await.map(|(_, task)| task)
    }

    /// Like [`dequeue`](Self::dequeue), also naming the backend the task came from
    pub async fn dequeue_with_source(&self, ctx: &Context) -> Result<(&str, Task), QueueError> {
        for entry in &self.queues {
            match entry.queue.dequeue(ctx).await {
                Ok(task) => return Ok((entry.name.as_str(), task)),
                Err(QueueError::Empty) => {
                    trace!(queue = %entry.name, "Queue empty, trying next");
                }
                Err(e) => return Err(e),
            }
        }
        Err(QueueError::Empty)
    }

    /// Queue names in scan order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.queues.iter().map(|q| q.name.as_str())
    }

    /// Entries in scan order
    pub fn entries(&self) -> &[PrioritizedQueue] {
        &self.queues
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::queue::InMemoryTaskQueue;
    use crate::task::TaskOption;

    /// Backend that always fails and counts dequeue attempts
    #[derive(Default)]
    struct BrokenQueue {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl TaskQueue for BrokenQueue {
        async fn enqueue(&self, _ctx: &Context, _task: Task) -> Result<(), QueueError> {
            Err(QueueError::Backend("connection refused".to_string()))
        }

        async fn dequeue(&self, _ctx: &Context) -> Result<Task, QueueError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(QueueError::Backend("connection refused".to_string()))
        }
    }

    fn entry(name: &str, priority: i32, queue: Arc<dyn TaskQueue>) -> PrioritizedQueue {
        PrioritizedQueue {
            name: name.to_string(),
            priority,
            queue,
        }
    }

    async fn push(queue: &InMemoryTaskQueue, payload: &str) {
        queue
            .enqueue(
                &Context::background(),
                Task::new("echo", [TaskOption::payload(payload)]),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_highest_priority_first() {
        let high = Arc::new(InMemoryTaskQueue::unbounded());
        let low = Arc::new(InMemoryTaskQueue::unbounded());
        push(&low, "low-1").await;
        push(&high, "high-1").await;
        push(&high, "high-2").await;

        let merged = PriorityTaskQueue::new(vec![
            entry("low", 1, low.clone()),
            entry("high", 10, high.clone()),
        ]);
        let ctx = Context::background();

        let (source, task) = merged.dequeue_with_source(&ctx).await.unwrap();
        assert_eq!(source, "high");
        assert_eq!(task.payload(), b"high-1");

        let task = merged.dequeue(&ctx).await.unwrap();
        assert_eq!(task.payload(), b"high-2");

        // High is drained, low is served
        let (source, task) = merged.dequeue_with_source(&ctx).await.unwrap();
        assert_eq!(source, "low");
        assert_eq!(task.payload(), b"low-1");

        assert_eq!(merged.dequeue(&ctx).await, Err(QueueError::Empty));
    }

    #[tokio::test]
    async fn test_high_priority_work_arriving_later_wins_next_scan() {
        let high = Arc::new(InMemoryTaskQueue::unbounded());
        let low = Arc::new(InMemoryTaskQueue::unbounded());
        push(&low, "low-1").await;
        push(&low, "low-2").await;

        let merged = PriorityTaskQueue::new(vec![
            entry("high", 5, high.clone()),
            entry("low", 0, low.clone()),
        ]);
        let ctx = Context::background();

        assert_eq!(merged.dequeue(&ctx).await.unwrap().payload(), b"low-1");
        push(&high, "high-1").await;
        assert_eq!(merged.dequeue(&ctx).await.unwrap().payload(), b"high-1");
        assert_eq!(merged.dequeue(&ctx).await.unwrap().payload(), b"low-2");
    }

    #[tokio::test]
    async fn test_failure_is_not_skipped() {
        let broken = Arc::new(BrokenQueue::default());
        let low = Arc::new(InMemoryTaskQueue::unbounded());
        push(&low, "low-1").await;

        let merged = PriorityTaskQueue::new(vec![
            entry("broken", 10, broken.clone()),
            entry("low", 1, low.clone()),
        ]);

        let result = merged.dequeue(&Context::background()).await;
        assert!(matches!(result, Err(QueueError::Backend(_))));
        assert_eq!(broken.attempts.load(Ordering::SeqCst), 1);
        // The lower-priority task is still waiting
        assert_eq!(low.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_below_non_empty_queue_is_not_reached() {
        let broken = Arc::new(BrokenQueue::default());
        let high = Arc::new(InMemoryTaskQueue::unbounded());
        push(&high, "high-1").await;

        let merged = PriorityTaskQueue::new(vec![
            entry("broken", 0, broken.clone()),
            entry("high", 10, high.clone()),
        ]);

        let task = merged.dequeue(&Context::background()).await.unwrap();
        assert_eq!(task.payload(), b"high-1");
        assert_eq!(broken.attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ties_broken_by_name() {
        let merged = PriorityTaskQueue::new(vec![
            entry("charlie", 1, Arc::new(InMemoryTaskQueue::unbounded())),
            entry("alpha", 1, Arc::new(InMemoryTaskQueue::unbounded())),
            entry("urgent", 9, Arc::new(InMemoryTaskQueue::unbounded())),
            entry("bravo", 1, Arc::new(InMemoryTaskQueue::unbounded())),
        ]);

        let names: Vec<_> = merged.names().collect();
        assert_eq!(names, vec!["urgent", "alpha", "bravo", "charlie"]);
    }

    #[test]
    fn test_from_maps_defaults_missing_priority_to_zero() {
        let mut queues: HashMap<String, Arc<dyn TaskQueue>> = HashMap::new();
        queues.insert("default".into(), Arc::new(InMemoryTaskQueue::unbounded()));
        queues.insert("bulk".into(), Arc::new(InMemoryTaskQueue::unbounded()));
        queues.insert("negative".into(), Arc::new(InMemoryTaskQueue::unbounded()));

        let mut priorities = HashMap::new();
        priorities.insert("default".to_string(), 1);
        priorities.insert("negative".to_string(), -3);
        priorities.insert("ghost".to_string(), 100);

        let merged = PriorityTaskQueue::from_maps(&queues, &priorities);

        assert_eq!(merged.len(), 3);
        let order: Vec<_> = merged
            .entries()
            .iter()
            .map(|e| (e.name.as_str(), e.priority))
            .collect();
        assert_eq!(order, vec![("default", 1), ("bulk", 0), ("negative", -3)]);
    }

    #[tokio::test]
    async fn test_empty_merge_queue() {
        let merged = PriorityTaskQueue::new(vec![]);
        assert!(merged.is_empty());
        assert_eq!(
            merged.dequeue(&Context::background()).await,
            Err(QueueError::Empty)
        );
    }
}
