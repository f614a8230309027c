//! Namespace and named-definition rows. Immutable once created: a
//! `NamedTask`/`NamedStep` is identified by `(namespace, name, version)` and
//! is never mutated in place — a new version is a new row.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskNamespace {
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable definition of a task type: `(namespace, name, version)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NamedTask {
    pub uuid: Uuid,
    pub task_namespace_uuid: Uuid,
    pub name: String,
    pub version: String,
    /// JSON Schema the `Task.context` must validate against at creation time.
    pub context_schema: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl NamedTask {
    pub const DEFAULT_NAMESPACE: &'static str = "default";
    pub const DEFAULT_VERSION: &'static str = "0.1.0";
}

/// Immutable definition of a step type within a named task's DAG.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NamedStep {
    pub uuid: Uuid,
    pub named_task_uuid: Uuid,
    pub name: String,
    pub retry_limit: i32,
    pub retryable: bool,
    /// Whether a parent's permanent failure may be bypassed for this step
    /// rather than propagating `blocked_by_failures` to it.
    pub skippable: bool,
    pub created_at: DateTime<Utc>,
}
