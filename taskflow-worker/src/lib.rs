//! Worker loop: drains the job queue and drives each delivered task through
//! the Workflow Coordinator and Task Finalizer. This is
//! the process-level shell around the orchestration core; it owns no
//! business logic of its own.

use std::sync::Arc;
use std::time::Duration;
use taskflow_orchestration::{CoordinatorExit, TaskFinalizer, WorkflowCoordinator};
use taskflow_shared::error::{CoreError, Result};
use taskflow_shared::messaging::JobQueue;
use tracing::{info, warn};
use uuid::Uuid;

pub struct WorkerLoop {
    job_queue: Arc<dyn JobQueue>,
    coordinator: Arc<WorkflowCoordinator>,
    finalizer: Arc<TaskFinalizer>,
    poll_batch_size: usize,
}

impl WorkerLoop {
    pub fn new(
        job_queue: Arc<dyn JobQueue>,
        coordinator: Arc<WorkflowCoordinator>,
        finalizer: Arc<TaskFinalizer>,
        poll_batch_size: usize,
    ) -> Self {
        Self {
            job_queue,
            coordinator,
            finalizer,
            poll_batch_size,
        }
    }

    /// Drain one batch of due deliveries and drive each to its next
    /// settled state. Returns how many tasks were processed.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<usize> {
        let due = self
            .job_queue
            .deliver(self.poll_batch_size)
            .await
            .map_err(|e| CoreError::Configuration(e.to_string()))?;

        for task_uuid in &due {
            if let Err(err) = self.drive_one(*task_uuid).await {
                warn!(task_uuid = %task_uuid, error = %err, "task delivery failed, will be retried on its next delivery");
            }
        }

        Ok(due.len())
    }

    async fn drive_one(&self, task_uuid: Uuid) -> Result<()> {
        let exit: CoordinatorExit = self.coordinator.drive(task_uuid).await?;
        self.finalizer.handle(task_uuid, exit).await
    }

    /// Poll forever at `poll_interval` until `shutdown` reports `true`.
    pub async fn run(&self, poll_interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(poll_interval_ms = poll_interval.as_millis() as u64, "worker loop starting");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("worker loop received shutdown signal");
                        break;
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {
                    match self.run_once().await {
                        Ok(n) if n > 0 => info!(delivered = n, "processed due task deliveries"),
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "job queue delivery failed"),
                    }
                }
            }
        }
    }
}
