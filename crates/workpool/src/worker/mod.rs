//! Workers and the pool that manages them
//!
//! This module provides:
//! - [`WorkerPool`] - lifecycle manager: submit, run, stop, resize
//! - [`Worker`] - one consume loop on its own Tokio task
//! - [`WorkerPoolConfig`] - pool configuration with builder methods
//! - [`PoolStats`] - counters of processed tasks by outcome
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       WorkerPool                         │
//! │   submit ──► queues["high" | "default" | ...]            │
//! │                        │                                 │
//! │                        ▼                                 │
//! │               PriorityTaskQueue                          │
//! │                        │                                 │
//! │        ┌───────────────┼───────────────┐                 │
//! │        ▼               ▼               ▼                 │
//! │   [Worker 0]      [Worker 1]  ...  [Worker N]            │
//! │   dequeue ─► HandlerRegistry ─► handler(ctx, task)       │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod backoff;
mod config;
mod executor;
mod panic;
mod pool;
mod stats;

pub use backoff::IdleBackoffConfig;
pub use config::{
    default_worker_size, WorkerPoolConfig, DEFAULT_DEQUEUE_TIMEOUT, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use executor::{ConsumeError, Worker, WorkerError, WorkerState};
pub use pool::{WorkerPool, WorkerPoolError};
pub use stats::{PoolStats, PoolStatsSnapshot};
