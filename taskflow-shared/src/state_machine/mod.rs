//! Task and Step state machines. Pure, guarded, and
//! idempotent: every transition is a no-I/O function from (current state,
//! event) to a next state or an `InvalidTransition` error.

mod events;
mod states;
mod step_state_machine;
mod task_state_machine;

pub use events::{StepEvent, TaskEvent};
pub use states::{StepState, TaskState};
pub use step_state_machine::StepStateMachine;
pub use task_state_machine::TaskStateMachine;
