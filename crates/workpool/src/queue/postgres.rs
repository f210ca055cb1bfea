//! PostgreSQL implementation of TaskQueue
//!
//! A named list stored in one table, shared by every process that connects to
//! the same database:
//! - Tasks stored as JSON records
//! - Push appends, pop takes the oldest entry (FIFO)
//! - Concurrent pops never return the same row, via SKIP LOCKED

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};

use super::backend::{QueueError, TaskQueue};
use crate::context::Context;
use crate::task::Task;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS workpool_task_lists (
    id BIGSERIAL PRIMARY KEY,
    list_name TEXT NOT NULL,
    task JSONB NOT NULL,
    pushed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_workpool_task_lists_name_id
    ON workpool_task_lists (list_name, id)
"#;

/// List-backed queue stored in PostgreSQL
///
/// Several pools may share a list; ordering across processes is whatever the
/// table order provides.
///
/// # Example
///
/// ```ignore
/// use sqlx::PgPool;
/// use workpool::PostgresTaskQueue;
///
/// let pool = PgPool::connect("postgres://localhost/mydb").await?;
/// PostgresTaskQueue::ensure_schema(&pool).await?;
/// let queue = PostgresTaskQueue::new(pool, "emails").with_max_len(10_000);
/// ```
#[derive(Clone)]
pub struct PostgresTaskQueue {
    pool: PgPool,
    list_name: String,
    max_len: Option<i64>,
}

impl PostgresTaskQueue {
    /// Create a queue reading and writing the list `list_name`
    pub fn new(pool: PgPool, list_name: impl Into<String>) -> Self {
        Self {
            pool,
            list_name: list_name.into(),
            max_len: None,
        }
    }

    /// Reject pushes once the list holds `max_len` entries
    ///
    /// The check and the insert run in one statement but are not serialized
    /// against concurrent producers, so the limit is approximate.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(i64::try_from(max_len).unwrap_or(i64::MAX));
        self
    }

    /// Create the backing table if it does not exist
    pub async fn ensure_schema(pool: &PgPool) -> Result<(), QueueError> {
        for statement in [CREATE_TABLE, CREATE_INDEX] {
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    /// Name of the list this queue reads and writes
    pub fn list_name(&self) -> &str {
        &self.list_name
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Number of entries currently in the list
    pub async fn count(&self) -> Result<usize, QueueError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM workpool_task_lists WHERE list_name = $1")
            .bind(&self.list_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        let n: i64 = row.get("n");
        Ok(usize::try_from(n).unwrap_or(0))
    }

    async fn push(&self, record: serde_json::Value) -> Result<u64, sqlx::Error> {
        let result = match self.max_len {
            Some(max_len) => {
                sqlx::query(
                    r#"
                    INSERT INTO workpool_task_lists (list_name, task)
                    SELECT $1, $2
                    WHERE (SELECT COUNT(*) FROM workpool_task_lists WHERE list_name = $1) < $3
                    "#,
                )
                .bind(&self.list_name)
                .bind(&record)
                .bind(max_len)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query("INSERT INTO workpool_task_lists (list_name, task) VALUES ($1, $2)")
                    .bind(&self.list_name)
                    .bind(&record)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn pop(&self) -> Result<Option<serde_json::Value>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            DELETE FROM workpool_task_lists
            WHERE id = (
                SELECT id
                FROM workpool_task_lists
                WHERE list_name = $1
                ORDER BY id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING task
            "#,
        )
        .bind(&self.list_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("task")))
    }
}

#[async_trait]
impl TaskQueue for PostgresTaskQueue {
    #[instrument(skip(self, ctx, task), fields(list = %self.list_name, task_id = %task.id()))]
    async fn enqueue(&self, ctx: &Context, task: Task) -> Result<(), QueueError> {
        let record =
            serde_json::to_value(&task).map_err(|e| QueueError::Serialization(e.to_string()))?;

        let inserted = ctx
            .run_until_cancelled(self.push(record))
            .await
            .ok_or(QueueError::Timeout)?
            .map_err(|e| {
                error!("Failed to push task: {}", e);
                QueueError::Backend(e.to_string())
            })?;

        if inserted == 0 {
            return Err(QueueError::Full);
        }

        debug!("pushed task");
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(list = %self.list_name))]
    async fn dequeue(&self, ctx: &Context) -> Result<Task, QueueError> {
        if ctx.is_cancelled() {
            return Err(QueueError::Timeout);
        }

        // Once issued, the pop must run to completion: the DELETE may already
        // have committed when the future is dropped.
        let record = self
            .pop()
            .await
            .map_err(|e| {
                error!("Failed to pop task: {}", e);
                QueueError::Backend(e.to_string())
            })?
            .ok_or(QueueError::Empty)?;

        serde_json::from_value(record).map_err(|e| QueueError::Serialization(e.to_string()))
    }
}

impl std::fmt::Debug for PostgresTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTaskQueue")
            .field("list_name", &self.list_name)
            .field("max_len", &self.max_len)
            .finish()
    }
}
