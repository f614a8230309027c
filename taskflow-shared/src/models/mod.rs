//! Persisted data model: namespaces, named definitions, task/step
//! instances, the step DAG, and the append-only transition history tables.

mod edges;
mod handler_def;
mod step;
mod task;
mod transitions;

pub use edges::StepEdge;
pub use handler_def::{NamedStep, NamedTask, TaskNamespace};
pub use step::WorkflowStep;
pub use task::Task;
pub use transitions::{StepTransition, TaskTransition};
