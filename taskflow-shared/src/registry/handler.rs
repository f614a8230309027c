//! `StepHandler` / `TaskHandler` contracts.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// Outcome of one handler invocation for a single step.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Complete { result: Value },
    TransientFailure { reason: String },
    PermanentFailure { reason: String },
    /// Handler-signaled backoff override, honored by the Retry & Backoff
    /// Calculator in place of the exponential default.
    RequestBackoff { seconds: i64, reason: String },
}

/// Executed once per claimed, ready `WorkflowStep`. Implementations must be
/// idempotent with respect to `attempts`: the Core guarantees at-least-once
/// delivery, never exactly-once (spec Non-goals).
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// The step name this handler services, within its owning task template.
    fn step_name(&self) -> &str;

    async fn execute(
        &self,
        task_uuid: Uuid,
        step_uuid: Uuid,
        task_context: &Value,
        step_checkpoint: Option<&Value>,
    ) -> StepOutcome;
}

/// Optional task-level hook invoked at well-defined lifecycle points
/// (before first step, after finalization). Most task templates need only
/// their `StepHandler`s; `TaskHandler` exists for templates that need
/// task-scoped setup/teardown.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn task_name(&self) -> &str;

    async fn on_task_started(&self, _task_uuid: Uuid, _context: &Value) {}

    async fn on_task_finalized(&self, _task_uuid: Uuid, _complete: bool) {}
}
