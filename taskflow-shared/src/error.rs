//! Error taxonomy shared by every taskflow crate.

use uuid::Uuid;

/// The unified error type returned by taskflow-shared and layered on by
/// taskflow-orchestration / taskflow-worker.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation failed for {entity}: {reason}")]
    Validation { entity: String, reason: String },

    #[error("handler for task {task_uuid} step {step_uuid} failed transiently: {reason}")]
    TransientHandler {
        task_uuid: Uuid,
        step_uuid: Uuid,
        reason: String,
    },

    #[error("handler for task {task_uuid} step {step_uuid} failed permanently: {reason}")]
    PermanentHandler {
        task_uuid: Uuid,
        step_uuid: Uuid,
        reason: String,
    },

    #[error("handler requested backoff of {seconds}s for step {step_uuid}")]
    ServerRequestedBackoff { step_uuid: Uuid, seconds: i64 },

    #[error("invalid transition for {entity} {entity_uuid}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        entity_uuid: Uuid,
        from: String,
        to: String,
    },

    #[error("concurrency conflict claiming {entity} {entity_uuid}")]
    ConcurrencyConflict { entity: &'static str, entity_uuid: Uuid },

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("not found: {entity} {entity_uuid}")]
    NotFound { entity: &'static str, entity_uuid: Uuid },

    #[error("circuit breaker open for {component}, rejecting call")]
    CircuitOpen { component: &'static str },

    #[error("no handler registered for {namespace}/{name}/{version}")]
    HandlerNamespaceNotFound {
        namespace: String,
        name: String,
        version: String,
    },

    #[error("{namespace}/{name}/{version} has no handler named '{step_name}'")]
    HandlerStepNotFound {
        namespace: String,
        name: String,
        version: String,
        step_name: String,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn is_retryable_handler_error(&self) -> bool {
        matches!(self, CoreError::TransientHandler { .. })
    }
}
