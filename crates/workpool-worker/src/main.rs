use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use sqlx::postgres::PgPoolOptions;
use workpool::telemetry::{init_telemetry, TelemetryConfig};
use workpool::{
    Context, InMemoryTaskQueue, PostgresTaskQueue, Task, TaskOption, WorkerPool, WorkerPoolConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Configure via environment variables:
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "workpool=debug")
    // - WORKPOOL_*: pool settings, see WorkerPoolConfig::from_env
    // - DATABASE_URL: adds a PostgreSQL-backed "shared" queue
    // - WORKPOOL_DEMO_TASKS: number of demo tasks submitted at startup
    let mut telemetry_config = TelemetryConfig::from_env().with_service_name("workpool-worker");
    if telemetry_config.log_filter.is_none() {
        telemetry_config.log_filter = Some("workpool=debug,workpool_worker=debug".to_string());
    }
    init_telemetry(telemetry_config).context("Failed to initialize telemetry")?;

    tracing::info!("workpool-worker starting...");

    let mut config = WorkerPoolConfig::from_env()
        .with_queue("high", Arc::new(InMemoryTaskQueue::unbounded()))
        .with_queue("low", Arc::new(InMemoryTaskQueue::unbounded()))
        .with_priority("high", 10)
        .with_priority("low", 0);

    if let Ok(database_url) = std::env::var("DATABASE_URL") {
        let db = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .context("Failed to connect to database")?;
        PostgresTaskQueue::ensure_schema(&db)
            .await
            .context("Failed to create task list table")?;

        let list = std::env::var("WORKPOOL_PG_LIST").unwrap_or_else(|_| "workpool".to_string());
        tracing::info!(list = %list, "PostgreSQL queue enabled");
        config = config
            .with_queue("shared", Arc::new(PostgresTaskQueue::new(db, list)))
            .with_priority("shared", 5);
    }

    tracing::info!(?config, "Worker pool configured");

    let pool = WorkerPool::new(config);
    register_demo_handlers(&pool);
    pool.run().await.context("Failed to start worker pool")?;

    let demo_tasks: usize = std::env::var("WORKPOOL_DEMO_TASKS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    if demo_tasks > 0 {
        submit_demo_tasks(&pool, demo_tasks).await?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");

    if let Err(e) = pool.stop().await {
        tracing::warn!(error = %e, "Worker pool did not stop cleanly");
    }

    let stats = pool.stats();
    tracing::info!(
        completed = stats.completed,
        failed = stats.failed,
        panicked = stats.panicked,
        handler_not_found = stats.handler_not_found,
        "Worker shutdown complete"
    );
    Ok(())
}

fn register_demo_handlers(pool: &WorkerPool) {
    pool.register_handler("echo", |_ctx, task| async move {
        tracing::info!(
            task_id = %task.id(),
            payload = %String::from_utf8_lossy(task.payload()),
            "echo"
        );
        Ok(())
    });

    // Payload is the sleep duration in milliseconds
    pool.register_handler("sleep", |ctx, task| async move {
        let millis: u64 = std::str::from_utf8(task.payload())?.trim().parse()?;
        ctx.run_until_cancelled(tokio::time::sleep(Duration::from_millis(millis)))
            .await
            .context("sleep cancelled by task timeout")?;
        Ok(())
    });

    pool.register_handler("fail", |_ctx, task| async move {
        anyhow::bail!(
            "failing on request: {}",
            String::from_utf8_lossy(task.payload())
        )
    });
}

async fn submit_demo_tasks(pool: &WorkerPool, count: usize) -> Result<()> {
    let ctx = Context::background();
    let queues = ["high", "default", "low"];

    for i in 0..count {
        let queue = queues[i % queues.len()];
        let task = Task::new("echo", [TaskOption::queue(queue)]);
        pool.submit(&ctx, &task, [TaskOption::payload(format!("demo {i} via {queue}"))])
            .await
            .with_context(|| format!("Failed to submit demo task {i}"))?;
    }

    tracing::info!(count, "Submitted demo tasks");
    Ok(())
}
