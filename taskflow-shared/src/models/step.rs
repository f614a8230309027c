use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// A concrete instance of a `NamedStep` within one `Task`'s DAG.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkflowStep {
    pub uuid: Uuid,
    pub task_uuid: Uuid,
    pub named_step_uuid: Uuid,
    pub attempts: i32,
    /// Set true for the duration of an in-flight execution claim; exactly one
    /// worker may hold this at a time for a given step.
    pub in_process: bool,
    pub processed: bool,
    /// Handler-requested backoff override, takes precedence over the
    /// exponential default when present.
    pub backoff_request_seconds: Option<i64>,
    pub last_attempted_at: Option<DateTime<Utc>>,
    /// Opaque handler-owned resumption state. Never interpreted by the core.
    pub checkpoint: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
