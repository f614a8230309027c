//! Handler Registry and the `StepHandler`/`TaskHandler`
//! contracts.

mod handler;
mod task_registry;

pub use handler::{StepHandler, StepOutcome, TaskHandler};
pub use task_registry::{HandlerKey, HandlerRegistry};
