use crate::state_machine::{StepState, TaskState};
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Append-only transition history row for a `Task`. Never updated in place
/// except for the `most_recent` flag, which is flipped to `false` on the
/// previous row in the same transaction that inserts the new one.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskTransition {
    pub uuid: Uuid,
    pub task_uuid: Uuid,
    pub from_state: Option<TaskState>,
    pub to_state: TaskState,
    pub most_recent: bool,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Append-only transition history row for a `WorkflowStep`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StepTransition {
    pub uuid: Uuid,
    pub step_uuid: Uuid,
    pub from_state: Option<StepState>,
    pub to_state: StepState,
    pub most_recent: bool,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}
