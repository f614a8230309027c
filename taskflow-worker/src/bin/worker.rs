//! Standalone worker process. Embedding applications that need custom
//! `StepHandler`s should depend on `taskflow-worker` as a library and build
//! their own `HandlerRegistry` instead of running this binary directly;
//! it exists as a reference wiring for deployments with no custom handlers.

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use taskflow_orchestration::{StepExecutor, TaskFinalizer, WorkflowCoordinator};
use taskflow_shared::config::CoreConfig;
use taskflow_shared::database::SqlFunctionExecutor;
use taskflow_shared::messaging::{EventPublisher, InMemoryJobQueue, JobQueue};
use taskflow_shared::registry::HandlerRegistry;
use taskflow_shared::retry::BackoffCalculator;
use taskflow_worker::WorkerLoop;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let environment = std::env::var("TASKFLOW_ENV").unwrap_or_else(|_| "development".to_string());
    let config_dir = std::env::var("TASKFLOW_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let config = CoreConfig::load(&config_dir, &environment)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    let registry = Arc::new(HandlerRegistry::new());
    let events = EventPublisher::default();
    let backoff = BackoffCalculator::new(config.backoff.clone());
    let sql_functions = SqlFunctionExecutor::new(pool.clone(), BackoffCalculator::new(config.backoff.clone()));

    let executor = Arc::new(StepExecutor::new(pool.clone(), registry.clone(), backoff, events.clone()));
    let coordinator = Arc::new(WorkflowCoordinator::new(
        pool.clone(),
        sql_functions.clone(),
        executor,
        config.orchestration.clone(),
    ));
    let job_queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
    let finalizer = Arc::new(TaskFinalizer::new(
        pool.clone(),
        sql_functions,
        job_queue.clone(),
        events,
        config.orchestration.clone(),
    ));

    let worker = WorkerLoop::new(job_queue, coordinator, finalizer, 16);
    let (_tx, rx) = tokio::sync::watch::channel(false);
    worker.run(Duration::from_millis(250), rx).await;

    Ok(())
}
