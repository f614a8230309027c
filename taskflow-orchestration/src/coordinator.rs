//! Workflow Coordinator: the per-task drive loop. Each iteration
//! reads `TaskExecutionContext.recommended_action` and either executes the
//! ready steps, or exits the loop so the Finalizer/Reenqueuer can decide
//! what happens next. Bounded iterations, and the loop must make forward
//! progress every time through or it hands off rather than spinning.

use crate::executor::{StepClaimTarget, StepExecutor};
use crate::stats::OrchestrationStatistics;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use taskflow_shared::config::OrchestrationConfig;
use taskflow_shared::database::{RecommendedAction, SqlFunctionExecutor};
use taskflow_shared::error::Result;
use taskflow_shared::registry::HandlerKey;
use taskflow_shared::state_machine::{TaskEvent, TaskState, TaskStateMachine};
use uuid::Uuid;

/// What the Coordinator decided after driving a task as far as it could this
/// call; tells the caller (the reenqueuer) what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorExit {
    /// Every step is in a terminal state; hand off to the Finalizer.
    ReadyToFinalize,
    /// Steps are in flight elsewhere; re-check after the "processing" delay.
    WaitForProcessing,
    /// Every ready step lost its claim race to another worker this
    /// iteration; re-check immediately rather than waiting out a
    /// processing delay nothing is actually using.
    ClaimRaceLost,
    /// No step is ready yet; re-check after the "waiting" delay.
    WaitForDependencies,
    /// At least one step is exhausted and blocking its dependents. Carries
    /// the earliest `next_retry_at` among the task's still-pending steps (if
    /// any) so the Finalizer can reenqueue closer to when that retry opens
    /// up instead of always waiting the flat maximum delay.
    BlockedByFailures { next_retry_at: Option<DateTime<Utc>> },
    /// Hit `max_coordinator_iterations` without settling; re-check soon.
    IterationBudgetExhausted,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ReadyStepRow {
    step_uuid: Uuid,
    step_name: String,
    namespace: String,
    task_name: String,
    task_version: String,
    task_context: Value,
}

pub struct WorkflowCoordinator {
    pool: PgPool,
    sql_functions: SqlFunctionExecutor,
    executor: Arc<StepExecutor>,
    orchestration: OrchestrationConfig,
    stats: Arc<OrchestrationStatistics>,
}

impl WorkflowCoordinator {
    pub fn new(
        pool: PgPool,
        sql_functions: SqlFunctionExecutor,
        executor: Arc<StepExecutor>,
        orchestration: OrchestrationConfig,
    ) -> Self {
        Self {
            pool,
            sql_functions,
            executor,
            orchestration,
            stats: Arc::new(OrchestrationStatistics::default()),
        }
    }

    /// Read-only counters for operational visibility; not exported as a
    /// metrics wire format.
    pub fn statistics(&self) -> Arc<OrchestrationStatistics> {
        self.stats.clone()
    }

    /// Drive `task_uuid` until it either settles on a terminal recommended
    /// action or exhausts its iteration budget.
    #[tracing::instrument(skip(self), fields(task_uuid = %task_uuid))]
    pub async fn drive(&self, task_uuid: Uuid) -> Result<CoordinatorExit> {
        self.ensure_started(task_uuid).await?;

        for _ in 0..self.orchestration.max_coordinator_iterations {
            let now = chrono::Utc::now();
            let context = self.sql_functions.task_execution_context(task_uuid, now).await?;

            match context.recommended_action {
                RecommendedAction::ExecuteReadySteps => {
                    let executed = self.execute_ready_steps(task_uuid).await?;
                    if executed == 0 {
                        // Every "ready" step lost its claim race to another
                        // worker this iteration: distinct from steps
                        // genuinely in flight, so the reenqueuer doesn't
                        // wait out a processing delay nothing is using.
                        return Ok(CoordinatorExit::ClaimRaceLost);
                    }
                }
                RecommendedAction::WaitForCompletion => return Ok(CoordinatorExit::WaitForProcessing),
                RecommendedAction::WaitForDependencies => {
                    return Ok(CoordinatorExit::WaitForDependencies)
                }
                RecommendedAction::HandleFailures => {
                    let next_retry_at = self.earliest_pending_retry(task_uuid, now).await?;
                    return Ok(CoordinatorExit::BlockedByFailures { next_retry_at });
                }
                RecommendedAction::FinalizeTask => return Ok(CoordinatorExit::ReadyToFinalize),
            }
        }

        Ok(CoordinatorExit::IterationBudgetExhausted)
    }

    /// Apply `TaskEvent::Start` on first drive activity, moving a freshly
    /// submitted `Task` from `Pending` to `InProgress`. A no-op once the task
    /// has already left `Pending` (retried drives, concurrent workers).
    async fn ensure_started(&self, task_uuid: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let current_state: TaskState = sqlx::query_scalar(
            "SELECT to_state FROM task_transitions WHERE task_uuid = $1 AND most_recent FOR UPDATE",
        )
        .bind(task_uuid)
        .fetch_one(&mut *tx)
        .await?;

        if current_state != TaskState::Pending {
            tx.rollback().await?;
            return Ok(());
        }

        let next_state = TaskStateMachine::apply(task_uuid, current_state, TaskEvent::Start)?;

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
        Ok(())
    }

    /// Earliest `next_retry_at` among this task's steps still eligible to
    /// retry, used to size the Finalizer's reenqueue delay when the task is
    /// blocked rather than always waiting the flat maximum.
    async fn earliest_pending_retry(&self, task_uuid: Uuid, now: chrono::DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let readiness = self.sql_functions.step_readiness(task_uuid, now).await?;
        Ok(readiness
            .iter()
            .filter(|r| r.retry_eligible && !r.exhausted)
            .filter_map(|r| r.next_retry_at)
            .min())
    }

    async fn execute_ready_steps(&self, task_uuid: Uuid) -> Result<usize> {
        let now = chrono::Utc::now();
        let readiness = self.sql_functions.step_readiness(task_uuid, now).await?;
        let ready_uuids: Vec<Uuid> = readiness
            .iter()
            .filter(|r| r.ready_for_execution)
            .map(|r| r.step_uuid)
            .collect();

        if ready_uuids.is_empty() {
            return Ok(0);
        }
        self.stats.record_steps_discovered(ready_uuids.len() as u64);

        let concurrency = ready_uuids
            .len()
            .clamp(self.orchestration.min_concurrent_steps, self.orchestration.max_concurrent_steps);
        let batch = &ready_uuids[..concurrency.min(ready_uuids.len())];

        let rows: Vec<ReadyStepRow> = sqlx::query_as(
            r#"
            SELECT
                ws.uuid AS step_uuid,
                ns.name AS step_name,
                tn.name AS namespace,
                nt.name AS task_name,
                nt.version AS task_version,
                t.context AS task_context
            FROM workflow_steps ws
            JOIN named_steps ns ON ns.uuid = ws.named_step_uuid
            JOIN named_tasks nt ON nt.uuid = ns.named_task_uuid
            JOIN task_namespaces tn ON tn.uuid = nt.task_namespace_uuid
            JOIN tasks t ON t.uuid = ws.task_uuid
            WHERE ws.uuid = ANY($1)
            "#,
        )
        .bind(batch)
        .fetch_all(&self.pool)
        .await?;

        let targets: Vec<StepClaimTarget> = rows
            .into_iter()
            .map(|row| StepClaimTarget {
                task_uuid,
                step_uuid: row.step_uuid,
                step_name: row.step_name,
                handler_key: HandlerKey::new(row.namespace, row.task_name, row.task_version),
                task_context: row.task_context,
            })
            .collect();

        let outcomes = join_all(
            targets
                .into_iter()
                .map(|target| self.executor.claim_and_execute(target)),
        )
        .await;

        let executed = outcomes
            .into_iter()
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .filter(|r| r.is_some())
            .count();
        self.stats.record_steps_executed(executed as u64);

        Ok(executed)
    }
}
