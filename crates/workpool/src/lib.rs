//! # Workpool
//!
//! A concurrent task-execution engine: a pool of workers draining several
//! named, prioritized queues and dispatching each task to the handler
//! registered for its key.
//!
//! ## Features
//!
//! - **Priority merge**: workers always take from the highest-priority
//!   non-empty queue
//! - **Pluggable backends**: in-process queues or a PostgreSQL list shared
//!   between processes
//! - **Containment**: handler errors and panics are logged and counted, never
//!   fatal to a worker
//! - **Lifecycle**: run, stop with a graceful deadline, and resize at runtime
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                            │
//! │  (submit / run / stop / resize, owns queues and handlers)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PriorityTaskQueue                         │
//! │  (InMemoryTaskQueue, PostgresTaskQueue, any TaskQueue)      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Worker × N  ──►  HandlerRegistry            │
//! │  (one consume loop per worker, handler runs under Context)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use workpool::prelude::*;
//!
//! # async fn example() -> Result<(), WorkerPoolError> {
//! let config = WorkerPoolConfig::new()
//!     .with_queue("high", Arc::new(InMemoryTaskQueue::unbounded()))
//!     .with_priority("high", 10);
//!
//! let pool = WorkerPool::new(config);
//! pool.register_handler("resize_image", |ctx, task| async move {
//!     if ctx.is_cancelled() {
//!         anyhow::bail!("task {} timed out before it started", task.id());
//!     }
//!     // ... work with task.payload()
//!     Ok(())
//! });
//!
//! pool.run().await?;
//!
//! let task = Task::new("resize_image", [TaskOption::timeout(Duration::from_secs(30))]);
//! pool.submit(&Context::background(), &task, [TaskOption::queue("high")])
//!     .await?;
//!
//! pool.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod handler;
pub mod queue;
pub mod task;
pub mod telemetry;
pub mod worker;

mod serde_util;

/// Prelude for common imports
pub mod prelude {
    pub use crate::context::{Context, ContextFactory};
    pub use crate::handler::{HandlerRegistry, HandlerResult};
    pub use crate::queue::{InMemoryTaskQueue, PostgresTaskQueue, QueueError, TaskQueue};
    pub use crate::task::{Task, TaskOption};
    pub use crate::worker::{WorkerPool, WorkerPoolConfig, WorkerPoolError};
}

// Re-export key types at crate root
pub use context::{background_factory, Context, ContextFactory};
pub use handler::{HandlerRegistry, HandlerResult, TaskHandler};
pub use queue::{
    InMemoryTaskQueue, PostgresTaskQueue, PrioritizedQueue, PriorityTaskQueue, QueueError,
    TaskQueue,
};
pub use task::{Task, TaskOption, TaskOptions, DEFAULT_QUEUE, DEFAULT_TASK_TIMEOUT};
pub use worker::{
    IdleBackoffConfig, PoolStatsSnapshot, Worker, WorkerError, WorkerPool, WorkerPoolConfig,
    WorkerPoolError,
};
