//! Queue backends and the priority merge queue
//!
//! This module provides:
//! - [`TaskQueue`] trait implemented by every backend
//! - [`InMemoryTaskQueue`] for in-process queues, bounded or unbounded
//! - [`PostgresTaskQueue`] for a list-backed queue shared through PostgreSQL
//! - [`PriorityTaskQueue`] presenting several backends as one ordered source
//!
//! # Architecture
//!
//! ```text
//!   submit ──► "high"    (priority 10) ──┐
//!   submit ──► "default" (priority 1)  ──┼──► PriorityTaskQueue ──► workers
//!   submit ──► "low"     (priority 0)  ──┘     (dequeue only)
//! ```

mod backend;
mod memory;
mod postgres;
mod priority;

pub use backend::{QueueError, TaskQueue};
pub use memory::InMemoryTaskQueue;
pub use postgres::PostgresTaskQueue;
pub use priority::{PrioritizedQueue, PriorityTaskQueue};
