//! Task Finalizer & Reenqueuer: turns a `CoordinatorExit` into
//! either a terminal `Task` transition or a scheduled re-delivery, using the
//! reenqueue delay table from `OrchestrationConfig`.

use crate::coordinator::CoordinatorExit;
use crate::stats::{OrchestrationStatistics, ReenqueueReason};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use taskflow_shared::config::OrchestrationConfig;
use taskflow_shared::database::{HealthStatus, SqlFunctionExecutor};
use taskflow_shared::error::Result;
use taskflow_shared::messaging::{EventPublisher, JobQueue, TaskflowEvent};
use taskflow_shared::state_machine::{TaskEvent, TaskState, TaskStateMachine};
use uuid::Uuid;

pub struct TaskFinalizer {
    pool: PgPool,
    sql_functions: SqlFunctionExecutor,
    job_queue: Arc<dyn JobQueue>,
    events: EventPublisher,
    orchestration: OrchestrationConfig,
    stats: Arc<OrchestrationStatistics>,
}

impl TaskFinalizer {
    pub fn new(
        pool: PgPool,
        sql_functions: SqlFunctionExecutor,
        job_queue: Arc<dyn JobQueue>,
        events: EventPublisher,
        orchestration: OrchestrationConfig,
    ) -> Self {
        Self {
            pool,
            sql_functions,
            job_queue,
            events,
            orchestration,
            stats: Arc::new(OrchestrationStatistics::default()),
        }
    }

    /// Read-only counters for operational visibility; not exported as a
    /// metrics wire format.
    pub fn statistics(&self) -> Arc<OrchestrationStatistics> {
        self.stats.clone()
    }

    /// Act on the Coordinator's exit: finalize a settled task, or reenqueue
    /// it for another pass after the action-appropriate delay.
    #[tracing::instrument(skip(self), fields(task_uuid = %task_uuid))]
    pub async fn handle(&self, task_uuid: Uuid, exit: CoordinatorExit) -> Result<()> {
        match exit {
            CoordinatorExit::ReadyToFinalize => self.finalize(task_uuid).await,
            CoordinatorExit::WaitForProcessing => {
                self.stats.record_reenqueue(ReenqueueReason::Processing);
                self.reenqueue(task_uuid, self.orchestration.reenqueue_processing_delay_seconds)
                    .await
            }
            CoordinatorExit::ClaimRaceLost => {
                // Nothing is actually in flight; re-check on the next pass
                // instead of waiting out a processing delay meant for steps
                // another worker is genuinely executing.
                self.stats.record_reenqueue(ReenqueueReason::ClaimRaceLost);
                self.reenqueue(task_uuid, 0).await
            }
            CoordinatorExit::WaitForDependencies => {
                self.stats.record_reenqueue(ReenqueueReason::WaitingForDependencies);
                self.reenqueue(task_uuid, self.orchestration.reenqueue_waiting_delay_seconds)
                    .await
            }
            CoordinatorExit::BlockedByFailures { next_retry_at } => {
                // A blocked task is still retried: reenqueue as close to its
                // earliest step's own backoff window as we can, capped at
                // the configured maximum so a distant retry doesn't silence
                // re-checks indefinitely.
                self.stats.record_reenqueue(ReenqueueReason::BlockedByFailures);
                let max_delay = self.orchestration.reenqueue_blocked_max_delay_seconds;
                let delay = match next_retry_at {
                    Some(retry_at) => (retry_at - chrono::Utc::now()).num_seconds().clamp(0, max_delay),
                    None => max_delay,
                };
                self.reenqueue(task_uuid, delay).await
            }
            CoordinatorExit::IterationBudgetExhausted => {
                self.stats.record_reenqueue(ReenqueueReason::IterationBudgetExhausted);
                self.reenqueue(task_uuid, self.orchestration.reenqueue_processing_delay_seconds)
                    .await
            }
        }
    }

    async fn reenqueue(&self, task_uuid: Uuid, delay_seconds: i64) -> Result<()> {
        self.job_queue
            .enqueue(task_uuid, Duration::from_secs(delay_seconds.max(0) as u64))
            .await
            .map_err(|e| taskflow_shared::error::CoreError::Configuration(e.to_string()))
    }

    async fn finalize(&self, task_uuid: Uuid) -> Result<()> {
        let now = chrono::Utc::now();
        let context = self.sql_functions.task_execution_context(task_uuid, now).await?;

        let current_state: TaskState =
            sqlx::query_scalar("SELECT to_state FROM task_transitions WHERE task_uuid = $1 AND most_recent")
                .bind(task_uuid)
                .fetch_one(&self.pool)
                .await?;

        let (event, complete) = match context.health_status {
            HealthStatus::Healthy | HealthStatus::Degraded => (TaskEvent::Complete, true),
            HealthStatus::Blocked => (TaskEvent::Fail, false),
        };

        let next_state = TaskStateMachine::apply(task_uuid, current_state, event)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE tasks SET complete = $2 WHERE uuid = $1")
            .bind(task_uuid)
            .bind(complete)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE task_transitions SET most_recent = false WHERE task_uuid = $1 AND most_recent")
            .bind(task_uuid)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO task_transitions (uuid, task_uuid, from_state, to_state, most_recent) \
             VALUES ($1, $2, $3, $4, true)",
        )
        .bind(Uuid::new_v4())
        .bind(task_uuid)
        .bind(current_state)
        .bind(next_state)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.stats.record_task_finalized(complete);

        if complete {
            self.events.publish(TaskflowEvent::TaskCompleted { task_uuid });
        } else {
            self.events.publish(TaskflowEvent::TaskFailed {
                task_uuid,
                reason: format!("{} of {} steps blocked by exhausted retries", context.error_steps, context.total_steps),
            });
        }

        Ok(())
    }
}
