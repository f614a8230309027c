use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One edge `from_step -> to_step` in a task's step DAG: `to_step` depends on
/// `from_step` having completed (or been skipped) before it can run.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StepEdge {
    pub uuid: Uuid,
    pub task_uuid: Uuid,
    pub from_step_uuid: Uuid,
    pub to_step_uuid: Uuid,
    pub created_at: DateTime<Utc>,
}
