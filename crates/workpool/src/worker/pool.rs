//! Worker pool for task execution
//!
//! Owns the queue backends, the handler registry and a set of [`Worker`]s.
//! Lifecycle transitions (`run`, `stop`, `resize`) are serialized on the
//! worker list lock, which is never held while waiting on handlers;
//! `submit` only reads the running flag and the queue map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, instrument, warn};

use super::config::WorkerPoolConfig;
use super::executor::{millis, Worker, WorkerShared};
use super::stats::{PoolStats, PoolStatsSnapshot};
use crate::context::{Context, ContextFactory};
use crate::handler::{HandlerRegistry, HandlerResult};
use crate::queue::{PriorityTaskQueue, QueueError, TaskQueue};
use crate::task::{Task, TaskOption};

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    /// `run` called on a running pool
    #[error("worker pool is already running")]
    AlreadyRunning,

    /// Submit or stop on a pool that is not running
    #[error("worker pool is not running")]
    NotRunning,

    /// The task names a queue the pool was not configured with
    #[error("task queue not found: {0}")]
    QueueNotFound(String),

    /// Backend rejected the submitted task
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Workers did not finish within the shutdown timeout
    ///
    /// They keep stopping in the background; the pool is already stopped.
    #[error("graceful shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Pool of workers draining a set of prioritized queues
///
/// # Example
///
/// ```no_run
/// use workpool::{Context, Task, TaskOption, WorkerPool, WorkerPoolConfig};
///
/// # async fn example() -> Result<(), workpool::WorkerPoolError> {
/// let pool = WorkerPool::new(WorkerPoolConfig::new().with_worker_size(4));
///
/// pool.register_handler("echo", |_ctx, task| async move {
///     println!("{}", String::from_utf8_lossy(task.payload()));
///     Ok(())
/// });
///
/// pool.run().await?;
///
/// let task = Task::new("echo", []);
/// pool.submit(&Context::background(), &task, [TaskOption::payload("hello")])
///     .await?;
///
/// // ... later, graceful shutdown
/// pool.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct WorkerPool {
    shared: Arc<WorkerShared>,
    queues: HashMap<String, Arc<dyn TaskQueue>>,
    context_factory: ContextFactory,
    shutdown_timeout: Duration,
    running: Arc<AtomicBool>,
    size: AtomicUsize,
    next_worker_id: AtomicUsize,
    workers: Arc<Mutex<Vec<Arc<Worker>>>>,
}

impl WorkerPool {
    /// Create a pool with an empty handler registry
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self::with_handlers(config, Arc::new(HandlerRegistry::new()))
    }

    /// Create a pool sharing an existing handler registry
    pub fn with_handlers(config: WorkerPoolConfig, handlers: Arc<HandlerRegistry>) -> Self {
        let queue = PriorityTaskQueue::from_maps(&config.queues, &config.priorities);

        debug!(
            worker_size = config.worker_size,
            queues = ?queue.names().collect::<Vec<_>>(),
            "Worker pool created"
        );

        let shared = Arc::new(WorkerShared {
            queue,
            handlers,
            context_factory: Arc::clone(&config.context_factory),
            dequeue_timeout: config.dequeue_timeout,
            idle_backoff: config.idle_backoff.clone(),
            stats: Arc::new(PoolStats::new()),
        });

        Self {
            shared,
            queues: config.queues,
            context_factory: config.context_factory,
            shutdown_timeout: config.shutdown_timeout,
            running: Arc::new(AtomicBool::new(false)),
            size: AtomicUsize::new(config.worker_size),
            next_worker_id: AtomicUsize::new(0),
            workers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a task handler
    pub fn register_handler<F, Fut>(&self, key: impl Into<String>, handler: F)
    where
        F: Fn(Context, Task) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        self.shared.handlers.register(key, handler);
    }

    /// Handler registry used by this pool's workers
    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.shared.handlers
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Target number of workers
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Number of workers currently started
    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// Queue names in the order workers scan them
    pub fn queue_names(&self) -> Vec<String> {
        self.shared.queue.names().map(str::to_string).collect()
    }

    /// Get execution counters
    pub fn stats(&self) -> PoolStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Enqueue a copy of `task` with `opts` applied
    ///
    /// The caller's task is never modified. Fails with
    /// [`WorkerPoolError::NotRunning`] unless the pool is running, and with
    /// [`WorkerPoolError::QueueNotFound`] when the copy names an unknown queue.
    #[instrument(skip(self, ctx, task, opts), fields(task_id = %task.id(), key = %task.key()))]
    pub async fn submit<I>(
        &self,
        ctx: &Context,
        task: &Task,
        opts: I,
    ) -> Result<(), WorkerPoolError>
    where
        I: IntoIterator<Item = TaskOption>,
    {
        if !self.is_running() {
            return Err(WorkerPoolError::NotRunning);
        }

        let task = task.with_options(opts);
        let queue_name = task.queue().to_string();
        let Some(queue) = self.queues.get(&queue_name) else {
            return Err(WorkerPoolError::QueueNotFound(queue_name));
        };

        queue.enqueue(ctx, task).await?;

        debug!(queue = %queue_name, "Task submitted");
        Ok(())
    }

    /// Start `size()` workers
    ///
    /// Fails only with [`WorkerPoolError::AlreadyRunning`]; workers are
    /// created with their consume loops already spawned, so there is no
    /// partially started state.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), WorkerPoolError> {
        let mut workers = self.workers.lock().await;
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(WorkerPoolError::AlreadyRunning);
        }

        let size = self.size();
        workers.extend(self.start_workers(size));

        info!(
            worker_size = size,
            queues = ?self.queue_names(),
            "Worker pool started"
        );
        Ok(())
    }

    /// Stop every worker, waiting up to the shutdown timeout
    ///
    /// The pool is marked stopped as soon as it holds the worker list, so new
    /// submits are rejected. Workers finish their current task before
    /// exiting. The timeout covers the whole teardown, including waiting for
    /// a concurrent `run` or `resize` to release the list. If it elapses, or
    /// the context from the pool's factory is cancelled first,
    /// [`WorkerPoolError::ShutdownTimeout`] is returned and the teardown
    /// carries on in the background.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<(), WorkerPoolError> {
        let ctx = (self.context_factory)().child_with_timeout(self.shutdown_timeout);

        if !self.is_running() {
            return Err(WorkerPoolError::NotRunning);
        }

        let (claimed_tx, claimed_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let workers = Arc::clone(&self.workers);
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            let stopping = {
                let mut workers = workers.lock().await;
                if running
                    .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    let _ = claimed_tx.send(false);
                    return;
                }
                std::mem::take(&mut *workers)
            };
            let _ = claimed_tx.send(true);

            info!(worker_count = stopping.len(), "Initiating graceful shutdown");
            stop_workers(stopping).await;
            let _ = done_tx.send(());
        });

        let stopped = match ctx.run_until_cancelled(claimed_rx).await {
            Some(Ok(false)) => return Err(WorkerPoolError::NotRunning),
            Some(Ok(true)) => ctx.run_until_cancelled(done_rx).await.is_some(),
            Some(Err(_)) | None => false,
        };
        ctx.cancel();

        if !stopped {
            warn!(
                timeout_ms = millis(self.shutdown_timeout),
                "Shutdown timeout reached, workers still stopping in background"
            );
            return Err(WorkerPoolError::ShutdownTimeout(self.shutdown_timeout));
        }

        info!("Worker pool stopped");
        Ok(())
    }

    /// Change the number of workers to `size`
    ///
    /// Zero is ignored. On a stopped pool only the target size changes and it
    /// takes effect on the next `run`. On a running pool surplus workers are
    /// stopped (after their current task) or new ones started. Removed
    /// workers are detached from the pool before the call waits for them.
    #[instrument(skip(self))]
    pub async fn resize(&self, size: usize) -> Result<(), WorkerPoolError> {
        if size == 0 {
            debug!("Ignoring resize to zero workers");
            return Ok(());
        }

        let mut workers = self.workers.lock().await;

        if !self.is_running() {
            self.size.store(size, Ordering::Release);
            debug!(worker_size = size, "Worker pool target size updated");
            return Ok(());
        }

        let current = workers.len();
        if size == current {
            return Ok(());
        }

        self.size.store(size, Ordering::Release);
        info!(from = current, to = size, "Worker pool resized");

        if size < current {
            let removed = workers.split_off(size);
            drop(workers);
            stop_workers(removed).await;
        } else {
            let added = self.start_workers(size - current);
            workers.extend(added);
        }

        Ok(())
    }

    /// Start `count` new workers
    fn start_workers(&self, count: usize) -> Vec<Arc<Worker>> {
        (0..count)
            .map(|_| {
                let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
                Arc::new(Worker::spawn(id, Arc::clone(&self.shared)))
            })
            .collect()
    }
}

/// Stop workers concurrently, logging failures
async fn stop_workers(workers: Vec<Arc<Worker>>) {
    let handles: Vec<_> = workers
        .into_iter()
        .map(|worker| {
            tokio::spawn(async move {
                if let Err(e) = worker.stop().await {
                    warn!(worker_id = worker.id(), error = %e, "Failed to stop worker");
                }
            })
        })
        .collect();

    for result in join_all(handles).await {
        if let Err(e) = result {
            error!(error = %e, "Worker stop task failed");
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("running", &self.is_running())
            .field("size", &self.size())
            .field("queues", &self.queue_names())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}
