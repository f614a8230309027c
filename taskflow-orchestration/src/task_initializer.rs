//! Task submission: validates context against
//! its template's schema, deduplicates by `identity_hash`, and materializes
//! a `Task`'s full `WorkflowStep` DAG in one pass.

use crate::dependency_resolver::{persist_edges, DependencyResolver, StepDependencySpec};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use taskflow_shared::error::{CoreError, Result};
use taskflow_shared::models::{NamedStep, NamedTask};
use taskflow_shared::state_machine::{StepState, TaskState};
use taskflow_shared::validation::validate_context;
use uuid::Uuid;

pub struct TaskSubmission {
    pub named_task_uuid: Uuid,
    pub context: Value,
    pub priority: i32,
    pub correlation_id: Uuid,
    pub parent_correlation_id: Option<Uuid>,
    /// Step names (matching existing `NamedStep` rows for this `NamedTask`)
    /// and their intra-task dependencies.
    pub steps: Vec<StepDependencySpec>,
}

#[derive(Debug, Default)]
pub struct TaskInitializer;

impl TaskInitializer {
    /// Submit a new `Task`. If an existing task shares the same
    /// `(named_task_uuid, context)` identity hash, its uuid is returned
    /// instead of creating a duplicate.
    pub async fn submit(pool: &PgPool, submission: TaskSubmission) -> Result<Uuid> {
        let named_task: NamedTask = sqlx::query_as("SELECT * FROM named_tasks WHERE uuid = $1")
            .bind(submission.named_task_uuid)
            .fetch_optional(pool)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "named_task",
                entity_uuid: submission.named_task_uuid,
            })?;

        validate_context(&submission.context, named_task.context_schema.as_ref())?;

        let identity_hash =
            taskflow_shared::models::Task::identity_hash_for(named_task.uuid, &submission.context);

        if let Some(existing_uuid) =
            sqlx::query_scalar::<_, Uuid>("SELECT uuid FROM tasks WHERE identity_hash = $1")
                .bind(&identity_hash)
                .fetch_optional(pool)
                .await?
        {
            return Ok(existing_uuid);
        }

        let dag = DependencyResolver::resolve(&submission.steps)?;

        let mut tx = pool.begin().await?;

        let task_uuid = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO tasks (uuid, named_task_uuid, context, identity_hash, complete, priority, correlation_id, parent_correlation_id) \
             VALUES ($1, $2, $3, $4, false, $5, $6, $7)",
        )
        .bind(task_uuid)
        .bind(named_task.uuid)
        .bind(&submission.context)
        .bind(&identity_hash)
        .bind(submission.priority)
        .bind(submission.correlation_id)
        .bind(submission.parent_correlation_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO task_transitions (uuid, task_uuid, from_state, to_state, most_recent) \
             VALUES ($1, $2, NULL, $3, true)",
        )
        .bind(Uuid::new_v4())
        .bind(task_uuid)
        .bind(TaskState::Pending)
        .execute(&mut *tx)
        .await?;

        let mut step_uuids_by_name = HashMap::with_capacity(submission.steps.len());
        for spec in &submission.steps {
            let named_step: NamedStep = sqlx::query_as(
                "SELECT * FROM named_steps WHERE named_task_uuid = $1 AND name = $2",
            )
            .bind(named_task.uuid)
            .bind(&spec.step_name)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::Validation {
                entity: "named_step".to_string(),
                reason: format!(
                    "no named_step '{}' registered for named_task {}",
                    spec.step_name, named_task.uuid
                ),
            })?;

            let step_uuid = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO workflow_steps (uuid, task_uuid, named_step_uuid, attempts, in_process, processed) \
                 VALUES ($1, $2, $3, 0, false, false)",
            )
            .bind(step_uuid)
            .bind(task_uuid)
            .bind(named_step.uuid)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO step_transitions (uuid, step_uuid, from_state, to_state, most_recent) \
                 VALUES ($1, $2, NULL, $3, true)",
            )
            .bind(Uuid::new_v4())
            .bind(step_uuid)
            .bind(StepState::Pending)
            .execute(&mut *tx)
            .await?;

            step_uuids_by_name.insert(spec.step_name.clone(), step_uuid);
        }

        persist_edges(&mut tx, task_uuid, &dag, &step_uuids_by_name).await?;

        tx.commit().await?;

        Ok(task_uuid)
    }
}
