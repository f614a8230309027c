use super::events::StepEvent;
use super::states::StepState;
use crate::error::CoreError;
use uuid::Uuid;

/// Pure, guarded Step state machine, mirroring `TaskStateMachine`.
#[derive(Debug, Default)]
pub struct StepStateMachine;

impl StepStateMachine {
    pub fn apply(
        step_uuid: Uuid,
        current: StepState,
        event: StepEvent,
    ) -> Result<StepState, CoreError> {
        use StepEvent::*;
        use StepState::*;

        let target = match event {
            Claim => InProgress,
            Complete => Complete,
            Fail => Error,
            Cancel => Cancelled,
            ResolveManually => ResolvedManually,
            Skip => Skipped,
        };

        if target == current {
            return Ok(current);
        }

        let allowed = match (current, event) {
            (Pending, Claim) => true,
            (Pending, Skip) => true,
            (Pending, Cancel) => true,
            (InProgress, Complete) => true,
            (InProgress, Fail) => true,
            (InProgress, Cancel) => true,
            (Error, Claim) => true,
            (Error, Cancel) => true,
            (Error, ResolveManually) => true,
            (Error, Skip) => true,
            (Pending, ResolveManually) => true,
            (InProgress, ResolveManually) => true,
            _ => false,
        };

        if !allowed {
            return Err(CoreError::InvalidTransition {
                entity: "step",
                entity_uuid: step_uuid,
                from: current.to_string(),
                to: target.to_string(),
            });
        }

        Ok(target)
    }
}
