use super::events::TaskEvent;
use super::states::TaskState;
use crate::error::CoreError;
use uuid::Uuid;

/// Pure, guarded Task state machine. Holds no I/O — callers persist the
/// returned state themselves as a new `TaskTransition` row.
#[derive(Debug, Default)]
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Compute the next state for `task_uuid` currently in `current`,
    /// reacting to `event`. A request that would be a no-op (the event's
    /// target state equals `current`) returns `Ok(current)` without error,
    /// so redundant retries of the same event are idempotent.
    pub fn apply(
        task_uuid: Uuid,
        current: TaskState,
        event: TaskEvent,
    ) -> Result<TaskState, CoreError> {
        use TaskEvent::*;
        use TaskState::*;

        let target = match event {
            Start => InProgress,
            Complete => Complete,
            Fail => Error,
            Cancel => Cancelled,
            ResolveManually => ResolvedManually,
        };

        if target == current {
            return Ok(current);
        }

        let allowed = match (current, event) {
            (Pending, Start) => true,
            (Pending, Cancel) => true,
            (InProgress, Complete) => true,
            (InProgress, Fail) => true,
            (InProgress, Cancel) => true,
            (Error, Start) => true,
            (Error, Cancel) => true,
            (Error, ResolveManually) => true,
            (Pending, ResolveManually) => true,
            (InProgress, ResolveManually) => true,
            _ => false,
        };

        if !allowed {
            return Err(CoreError::InvalidTransition {
                entity: "task",
                entity_uuid: task_uuid,
                from: current.to_string(),
                to: target.to_string(),
            });
        }

        Ok(target)
    }
}
