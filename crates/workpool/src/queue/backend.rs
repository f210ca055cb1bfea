//! TaskQueue trait definition

use async_trait::async_trait;

use crate::context::Context;
use crate::task::Task;

/// Error type for queue operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Enqueue rejected because the queue is at capacity
    #[error("task queue full")]
    Full,

    /// Nothing to dequeue; a normal condition, not a failure
    #[error("task queue empty")]
    Empty,

    /// The context ended before the backend answered
    #[error("task queue operation timed out")]
    Timeout,

    /// Backend failure (connection, query, ...)
    #[error("task queue backend error: {0}")]
    Backend(String),

    /// Task record could not be encoded or decoded
    #[error("task serialization error: {0}")]
    Serialization(String),
}

impl QueueError {
    /// Whether this is the "no work" signal rather than a failure
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Storage for submitted tasks
///
/// Implementations are shared by every worker of a pool and must be safe for
/// concurrent enqueue and dequeue. Backends that may block should honour the
/// context's cancellation and deadline.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Store a task; returns [`QueueError::Full`] when at capacity
    async fn enqueue(&self, ctx: &Context, task: Task) -> Result<(), QueueError>;

    /// Take the next task; returns [`QueueError::Empty`] when there is none
    async fn dequeue(&self, ctx: &Context) -> Result<Task, QueueError>;
}
