//! Job Queue and Event subscriber collaborator contracts.

mod events;
mod job_queue;

pub use events::{EventPublisher, TaskflowEvent};
pub use job_queue::{InMemoryJobQueue, JobQueue, JobQueueError};
