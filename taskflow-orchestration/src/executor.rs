//! Step Executor: claims exactly one ready `WorkflowStep`,
//! invokes its registered `StepHandler`, and records the outcome as a new,
//! append-only `StepTransition`. The claim itself is a guarded read-modify
//! write: losing the race for a step is a `ConcurrencyConflict`, not an
//! error surfaced to the handler.

use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use taskflow_shared::error::{CoreError, Result};
use taskflow_shared::messaging::{EventPublisher, TaskflowEvent};
use taskflow_shared::registry::{HandlerKey, HandlerRegistry, StepOutcome};
use taskflow_shared::retry::BackoffCalculator;
use taskflow_shared::state_machine::{StepEvent, StepState, StepStateMachine};
use uuid::Uuid;

pub struct StepExecutor {
    pool: PgPool,
    registry: Arc<HandlerRegistry>,
    backoff: BackoffCalculator,
    events: EventPublisher,
}

/// Everything the Executor needs about one step to claim and run it, as
/// joined by the caller (the Coordinator already has this from the
/// readiness query plus the step's owning `NamedStep`/`NamedTask`).
pub struct StepClaimTarget {
    pub task_uuid: Uuid,
    pub step_uuid: Uuid,
    pub step_name: String,
    pub handler_key: HandlerKey,
    pub task_context: serde_json::Value,
}

impl StepExecutor {
    pub fn new(
        pool: PgPool,
        registry: Arc<HandlerRegistry>,
        backoff: BackoffCalculator,
        events: EventPublisher,
    ) -> Self {
        Self {
            pool,
            registry,
            backoff,
            events,
        }
    }

    /// Claim `target`, run its handler, and persist the resulting
    /// transition. Returns `Ok(None)` if another worker won the claim race
    /// first: a lost race is expected, non-exceptional traffic.
    #[tracing::instrument(skip(self, target), fields(task_uuid = %target.task_uuid, step_uuid = %target.step_uuid))]
    pub async fn claim_and_execute(&self, target: StepClaimTarget) -> Result<Option<StepState>> {
        let Some(checkpoint) = self.claim(target.step_uuid).await? else {
            return Ok(None);
        };

        let handler = self.registry.step_handler(&target.handler_key, &target.step_name)?;

        let outcome = handler
            .execute(
                target.task_uuid,
                target.step_uuid,
                &target.task_context,
                checkpoint.as_ref(),
            )
            .await;

        let final_state = self.record_outcome(target.task_uuid, target.step_uuid, outcome).await?;
        Ok(Some(final_state))
    }

    /// Guarded 4-write claim: validate the state-machine edge, flip
    /// `in_process`/bump `attempts`/stamp `last_attempted_at`, close out the
    /// previous transition, and open the `in_progress` one — all inside one
    /// transaction so a crash mid-claim leaves no step half-claimed.
    async fn claim(&self, step_uuid: Uuid) -> Result<Option<Option<serde_json::Value>>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(StepState, Option<serde_json::Value>)> = sqlx::query_as(
            r#"
            SELECT st.to_state, ws.checkpoint
            FROM step_transitions st
            JOIN workflow_steps ws ON ws.uuid = st.step_uuid
            WHERE st.step_uuid = $1 AND st.most_recent
            FOR UPDATE OF ws
            "#,
        )
        .bind(step_uuid)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((current_state, checkpoint)) = row else {
            return Err(CoreError::NotFound {
                entity: "workflow_step",
                entity_uuid: step_uuid,
            });
        };

        // An already-terminal or already-in-progress step lost the claim
        // race before we even reach the UPDATE below.
        if StepStateMachine::apply(step_uuid, current_state, StepEvent::Claim).is_err() {
            tx.rollback().await?;
            return Ok(None);
        }

        let claimed = sqlx::query(
            r#"
            UPDATE workflow_steps
            SET in_process = true, attempts = attempts + 1, last_attempted_at = $2
            WHERE uuid = $1 AND in_process = false
            "#,
        )
        .bind(step_uuid)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query("UPDATE step_transitions SET most_recent = false WHERE step_uuid = $1 AND most_recent")
            .bind(step_uuid)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO step_transitions (uuid, step_uuid, from_state, to_state, most_recent) \
             VALUES ($1, $2, $3, $4, true)",
        )
        .bind(Uuid::new_v4())
        .bind(step_uuid)
        .bind(current_state)
        .bind(StepState::InProgress)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(checkpoint))
    }

    async fn record_outcome(
        &self,
        task_uuid: Uuid,
        step_uuid: Uuid,
        outcome: StepOutcome,
    ) -> Result<StepState> {
        let (event, backoff_request_seconds, checkpoint, publish) = match outcome {
            StepOutcome::Complete { result } => (
                StepEvent::Complete,
                None,
                None,
                TaskflowEvent::StepCompleted {
                    task_uuid,
                    step_uuid,
                    result,
                },
            ),
            StepOutcome::TransientFailure { reason } => (
                StepEvent::Fail,
                None,
                None,
                TaskflowEvent::StepFailed {
                    task_uuid,
                    step_uuid,
                    reason,
                },
            ),
            StepOutcome::PermanentFailure { reason } => (
                StepEvent::Fail,
                None,
                None,
                TaskflowEvent::StepFailed {
                    task_uuid,
                    step_uuid,
                    reason,
                },
            ),
            StepOutcome::RequestBackoff { seconds, reason } => (
                StepEvent::Fail,
                Some(seconds),
                None,
                TaskflowEvent::StepFailed {
                    task_uuid,
                    step_uuid,
                    reason,
                },
            ),
        };

        let mut tx = self.pool.begin().await?;

        let current_state: StepState = sqlx::query_scalar(
            "SELECT to_state FROM step_transitions WHERE step_uuid = $1 AND most_recent",
        )
        .bind(step_uuid)
        .fetch_one(&mut *tx)
        .await?;

        let next_state = StepStateMachine::apply(step_uuid, current_state, event)?;

        let (attempts, retry_limit, retryable): (i32, i32, bool) = sqlx::query_as(
            "SELECT ws.attempts, ns.retry_limit, ns.retryable \
             FROM workflow_steps ws JOIN named_steps ns ON ns.uuid = ws.named_step_uuid \
             WHERE ws.uuid = $1",
        )
        .bind(step_uuid)
        .fetch_one(&mut *tx)
        .await?;

        let processed = match event {
            StepEvent::Fail => attempts >= retry_limit || !retryable,
            _ => true,
        };

        sqlx::query(
            "UPDATE workflow_steps SET in_process = false, processed = $4, backoff_request_seconds = $2, checkpoint = $3 \
             WHERE uuid = $1",
        )
        .bind(step_uuid)
        .bind(backoff_request_seconds)
        .bind(checkpoint)
        .bind(processed)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE step_transitions SET most_recent = false WHERE step_uuid = $1 AND most_recent")
            .bind(step_uuid)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO step_transitions (uuid, step_uuid, from_state, to_state, most_recent) \
             VALUES ($1, $2, $3, $4, true)",
        )
        .bind(Uuid::new_v4())
        .bind(step_uuid)
        .bind(current_state)
        .bind(next_state)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.events.publish(publish);
        Ok(next_state)
    }

    pub fn backoff(&self) -> &BackoffCalculator {
        &self.backoff
    }
}
