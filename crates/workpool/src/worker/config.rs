//! Worker pool configuration

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::backoff::IdleBackoffConfig;
use crate::context::{background_factory, ContextFactory};
use crate::queue::{InMemoryTaskQueue, TaskQueue};
use crate::task::DEFAULT_QUEUE;

/// Default graceful shutdown deadline
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a single dequeue
pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Number of workers used when none is configured
pub fn default_worker_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Worker pool configuration
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use workpool::{InMemoryTaskQueue, WorkerPoolConfig};
///
/// let config = WorkerPoolConfig::new()
///     .with_worker_size(8)
///     .with_queue("high", Arc::new(InMemoryTaskQueue::unbounded()))
///     .with_priority("high", 10)
///     .with_shutdown_timeout(Duration::from_secs(10));
///
/// assert_eq!(config.worker_size, 8);
/// ```
#[derive(Clone)]
pub struct WorkerPoolConfig {
    /// Number of workers started by `run`
    pub worker_size: usize,

    /// Queue backends by name
    pub queues: HashMap<String, Arc<dyn TaskQueue>>,

    /// Queue priorities by name; higher is served first, missing means 0
    pub priorities: HashMap<String, i32>,

    /// Source of the parent context for every consume cycle and every stop
    pub context_factory: ContextFactory,

    /// How long `stop` waits for workers before reporting a timeout
    pub shutdown_timeout: Duration,

    /// Bound on one dequeue; also the longest a stop request can go unnoticed
    /// while a backend blocks
    pub dequeue_timeout: Duration,

    /// Wait between scans when every queue is empty
    pub idle_backoff: IdleBackoffConfig,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        let mut queues: HashMap<String, Arc<dyn TaskQueue>> = HashMap::new();
        queues.insert(
            DEFAULT_QUEUE.to_string(),
            Arc::new(InMemoryTaskQueue::unbounded()),
        );

        let mut priorities = HashMap::new();
        priorities.insert(DEFAULT_QUEUE.to_string(), 1);

        Self {
            worker_size: default_worker_size(),
            queues,
            priorities,
            context_factory: background_factory(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            dequeue_timeout: DEFAULT_DEQUEUE_TIMEOUT,
            idle_backoff: IdleBackoffConfig::default(),
        }
    }
}

impl WorkerPoolConfig {
    /// Default configuration: one unbounded in-memory queue named "default"
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// - `WORKPOOL_WORKER_SIZE`
    /// - `WORKPOOL_SHUTDOWN_TIMEOUT_MS`
    /// - `WORKPOOL_DEQUEUE_TIMEOUT_MS`
    /// - `WORKPOOL_IDLE_MIN_MS`, `WORKPOOL_IDLE_MAX_MS`
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |name: &str| lookup(name).and_then(|s| s.trim().parse::<u64>().ok());
        let defaults = Self::default();

        let worker_size = parse("WORKPOOL_WORKER_SIZE")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(defaults.worker_size);
        let shutdown_timeout = parse("WORKPOOL_SHUTDOWN_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.shutdown_timeout);
        let dequeue_timeout = parse("WORKPOOL_DEQUEUE_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.dequeue_timeout);

        let mut idle_backoff = defaults.idle_backoff.clone();
        if let Some(ms) = parse("WORKPOOL_IDLE_MIN_MS") {
            idle_backoff = idle_backoff.with_min_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = parse("WORKPOOL_IDLE_MAX_MS") {
            idle_backoff = idle_backoff.with_max_interval(Duration::from_millis(ms));
        }

        Self {
            worker_size,
            shutdown_timeout,
            dequeue_timeout,
            idle_backoff,
            ..defaults
        }
        .with_worker_size(worker_size)
    }

    /// Set the number of workers; 0 selects the host's available parallelism
    pub fn with_worker_size(mut self, size: usize) -> Self {
        self.worker_size = if size == 0 {
            default_worker_size()
        } else {
            size
        };
        self
    }

    /// Add or replace one queue backend
    pub fn with_queue(mut self, name: impl Into<String>, queue: Arc<dyn TaskQueue>) -> Self {
        self.queues.insert(name.into(), queue);
        self
    }

    /// Replace every queue backend
    ///
    /// Priorities for names absent from `queues` are dropped.
    pub fn with_queues(mut self, queues: HashMap<String, Arc<dyn TaskQueue>>) -> Self {
        self.priorities.retain(|name, _| queues.contains_key(name));
        self.queues = queues;
        self
    }

    /// Set the priority of one queue
    pub fn with_priority(mut self, name: impl Into<String>, priority: i32) -> Self {
        self.priorities.insert(name.into(), priority);
        self
    }

    /// Replace every queue priority
    pub fn with_priorities(mut self, priorities: HashMap<String, i32>) -> Self {
        self.priorities = priorities;
        self
    }

    /// Set the context factory
    pub fn with_context_factory(mut self, factory: ContextFactory) -> Self {
        self.context_factory = factory;
        self
    }

    /// Set shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the bound on a single dequeue
    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    /// Set idle backoff
    pub fn with_idle_backoff(mut self, config: IdleBackoffConfig) -> Self {
        self.idle_backoff = config;
        self
    }
}

impl fmt::Debug for WorkerPoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut queues: Vec<_> = self.queues.keys().collect();
        queues.sort();

        f.debug_struct("WorkerPoolConfig")
            .field("worker_size", &self.worker_size)
            .field("queues", &queues)
            .field("priorities", &self.priorities)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("dequeue_timeout", &self.dequeue_timeout)
            .field("idle_backoff", &self.idle_backoff)
            .finish()
    }
}
