//! Event subscriber collaborator: fire-and-forget, bounded
//! in-process fan-out. Never affects Core state — a failed or slow
//! subscriber is swallowed and logged.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskflowEvent {
    TaskStarted { task_uuid: Uuid },
    TaskCompleted { task_uuid: Uuid },
    TaskFailed { task_uuid: Uuid, reason: String },
    StepCompleted { task_uuid: Uuid, step_uuid: Uuid, result: Value },
    StepFailed { task_uuid: Uuid, step_uuid: Uuid, reason: String },
}

/// Bounded, non-blocking fan-out publisher. Publishing never blocks or errors the caller — a
/// lagging subscriber simply misses events once the channel's capacity is
/// exceeded, per `tokio::sync::broadcast` semantics.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<TaskflowEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskflowEvent> {
        self.sender.subscribe()
    }

    /// Fire-and-forget publish. No receivers is not an error.
    pub fn publish(&self, event: TaskflowEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}
