//! Single worker: one consume loop on its own task
//!
//! Each cycle derives a context from the pool's factory, dequeues from the
//! priority merge queue within the dequeue timeout, resolves the handler and
//! runs it under a context bounded by the task's timeout. Nothing that happens
//! inside a cycle ends the loop; only the stop signal does.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span, warn, Instrument};

use super::backoff::{IdleBackoff, IdleBackoffConfig};
use super::panic::panic_message;
use super::stats::PoolStats;
use crate::context::{Context, ContextFactory};
use crate::handler::{HandlerRegistry, HandlerResult, TaskHandler};
use crate::queue::{PriorityTaskQueue, QueueError};
use crate::task::Task;

/// State shared by every worker of a pool
pub(crate) struct WorkerShared {
    pub(crate) queue: PriorityTaskQueue,
    pub(crate) handlers: Arc<HandlerRegistry>,
    pub(crate) context_factory: ContextFactory,
    pub(crate) dequeue_timeout: Duration,
    pub(crate) idle_backoff: IdleBackoffConfig,
    pub(crate) stats: Arc<PoolStats>,
}

/// Worker lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    /// `run` called on a running worker
    #[error("worker is already running")]
    AlreadyRunning,

    /// `stop` called on a stopped worker
    #[error("worker is not running")]
    NotRunning,
}

/// Failure of one consume cycle
///
/// These are logged and counted by the worker; they never reach the submitter.
#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    /// Dequeue failed (including the empty signal)
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// No handler registered for the task's key
    #[error("task handler not found for key {key} (task {task_id})")]
    HandlerNotFound { task_id: String, key: String },

    /// Handler returned an error
    #[error("handler {key} failed on task {task_id}: {error:#}")]
    HandlerFailed {
        task_id: String,
        key: String,
        error: anyhow::Error,
    },

    /// Handler panicked; the panic was contained
    #[error("handler {key} panicked on task {task_id}: {message}")]
    HandlerPanicked {
        task_id: String,
        key: String,
        message: String,
    },
}

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Running,
}

struct ActiveLoop {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// One consume loop bound to a pool's shared state
pub struct Worker {
    id: usize,
    shared: Arc<WorkerShared>,
    running: AtomicBool,
    active: Mutex<Option<ActiveLoop>>,
}

impl Worker {
    pub(crate) fn new(id: usize, shared: Arc<WorkerShared>) -> Self {
        Self {
            id,
            shared,
            running: AtomicBool::new(false),
            active: Mutex::new(None),
        }
    }

    /// Worker index within its pool
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> WorkerState {
        if self.is_running() {
            WorkerState::Running
        } else {
            WorkerState::Stopped
        }
    }

    /// Start the consume loop on a new Tokio task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(&self) -> Result<(), WorkerError> {
        let mut active = self.active.lock();
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(WorkerError::AlreadyRunning);
        }

        *active = Some(self.start_loop());
        Ok(())
    }

    /// Create a worker whose consume loop is already running
    pub(crate) fn spawn(id: usize, shared: Arc<WorkerShared>) -> Self {
        let mut worker = Self::new(id, shared);
        let active = worker.start_loop();
        *worker.active.get_mut() = Some(active);
        *worker.running.get_mut() = true;
        worker
    }

    fn start_loop(&self) -> ActiveLoop {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(consume_loop(self.id, Arc::clone(&self.shared), stop_rx));
        debug!(worker_id = self.id, "Worker started");
        ActiveLoop { stop_tx, handle }
    }

    /// Signal the loop and wait until it has exited
    ///
    /// A handler in progress runs to completion first.
    pub async fn stop(&self) -> Result<(), WorkerError> {
        let active = {
            let mut active = self.active.lock();
            if self
                .running
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(WorkerError::NotRunning);
            }
            active.take()
        };

        if let Some(ActiveLoop { stop_tx, handle }) = active {
            let _ = stop_tx.send(true);
            if let Err(e) = handle.await {
                // Handler panics are contained inside the loop; this covers the
                // loop itself.
                error!(worker_id = self.id, error = %e, "Worker loop ended abnormally");
            }
        }

        debug!(worker_id = self.id, "Worker stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

fn stop_requested(stop_rx: &watch::Receiver<bool>) -> bool {
    // A dropped sender means the worker handle is gone
    *stop_rx.borrow() || stop_rx.has_changed().is_err()
}

async fn consume_loop(
    worker_id: usize,
    shared: Arc<WorkerShared>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut backoff = IdleBackoff::new(shared.idle_backoff.clone());

    while !stop_requested(&stop_rx) {
        let ctx = (shared.context_factory)();

        match consume(worker_id, &shared, &ctx).await {
            Ok(()) => {
                shared.stats.record_completed();
                backoff.reset();
            }
            Err(ConsumeError::Queue(QueueError::Empty)) => {
                if backoff.wait(&mut stop_rx).await {
                    break;
                }
            }
            Err(e @ ConsumeError::Queue(_)) => {
                shared.stats.record_dequeue_error();
                warn!(worker_id, error = %e, "Worker consume task error");
                if backoff.wait(&mut stop_rx).await {
                    break;
                }
            }
            Err(e) => {
                match &e {
                    ConsumeError::HandlerNotFound { .. } => {
                        shared.stats.record_handler_not_found();
                        warn!(worker_id, error = %e, "Worker consume task error");
                    }
                    ConsumeError::HandlerPanicked { .. } => {
                        shared.stats.record_panicked();
                        error!(worker_id, error = %e, "Worker recovered from handler panic");
                    }
                    _ => {
                        shared.stats.record_failed();
                        warn!(worker_id, error = %e, "Worker consume task error");
                    }
                }
                backoff.reset();
            }
        }
    }

    debug!(worker_id, "Worker loop exited");
}

/// One dequeue-dispatch cycle
async fn consume(
    worker_id: usize,
    shared: &WorkerShared,
    ctx: &Context,
) -> Result<(), ConsumeError> {
    let dequeue_ctx = ctx.child_with_timeout(shared.dequeue_timeout);
    let dequeued = shared.queue.dequeue_with_source(&dequeue_ctx).await;
    dequeue_ctx.cancel();
    let (queue, task) = dequeued?;

    let task_id = task.id().to_string();
    let key = task.key().to_string();

    let Some(handler) = shared.handlers.get(&key) else {
        return Err(ConsumeError::HandlerNotFound { task_id, key });
    };

    let queued_ms = (Utc::now() - task.created_at()).num_milliseconds();
    debug!(worker_id, %task_id, %key, queue, queued_ms, "Dispatching task");

    let timeout = task.timeout();
    let task_ctx = ctx.child_with_timeout(timeout);
    let span = info_span!("task", worker_id, task_id = %task_id, key = %key, queue);
    let started = Instant::now();

    let outcome = invoke(handler, task_ctx.clone(), task).instrument(span).await;

    let overran = task_ctx.deadline_exceeded();
    task_ctx.cancel();
    if overran {
        shared.stats.record_overran_timeout();
        warn!(
            worker_id,
            %task_id,
            %key,
            timeout_ms = millis(timeout),
            elapsed_ms = millis(started.elapsed()),
            "Handler returned after its timeout"
        );
    }

    match outcome {
        Ok(Ok(())) => {
            debug!(
                worker_id,
                %task_id,
                elapsed_ms = millis(started.elapsed()),
                "Task completed"
            );
            Ok(())
        }
        Ok(Err(error)) => Err(ConsumeError::HandlerFailed {
            task_id,
            key,
            error,
        }),
        Err(message) => Err(ConsumeError::HandlerPanicked {
            task_id,
            key,
            message,
        }),
    }
}

/// Whole milliseconds for log fields, saturating at `u64::MAX`
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Run a handler, turning a panic into its message
///
/// Covers both a panic while building the future and one while polling it.
async fn invoke(handler: TaskHandler, ctx: Context, task: Task) -> Result<HandlerResult, String> {
    let fut = std::panic::catch_unwind(AssertUnwindSafe(|| handler(ctx, task)))
        .map_err(|payload| panic_message(payload.as_ref()))?;

    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(payload.as_ref()))
}
