//! Job Queue collaborator: `enqueue(task_uuid, delay_seconds)` /
//! `deliver(task_uuid)`, at-least-once, duplicate-tolerant. The Core only
//! depends on this trait; concrete backends (in-memory, PGMQ-backed) live in
//! `taskflow-pgmq` and in this module's `InMemoryJobQueue` test double.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum JobQueueError {
    #[error("job queue unavailable: {0}")]
    Unavailable(String),
}

/// Schedules re-delivery of a task to the Coordinator. Implementations are
/// not required to guarantee exactly-once delivery (spec Non-goals) — the
/// Coordinator's readiness query is idempotent and safe to re-run on
/// duplicate or redundant deliveries.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Schedule `task_uuid` for (re)delivery after `delay`. A `delay` of
    /// zero means "as soon as possible".
    async fn enqueue(&self, task_uuid: Uuid, delay: Duration) -> Result<(), JobQueueError>;

    /// Pop up to `max` due deliveries. Returns only tasks whose delay has
    /// elapsed.
    async fn deliver(&self, max: usize) -> Result<Vec<Uuid>, JobQueueError>;
}

struct Entry {
    task_uuid: Uuid,
    ready_at: std::time::Instant,
}

/// In-process job queue, used by tests and single-node deployments that
/// don't need the PGMQ-backed queue in `taskflow-pgmq`.
#[derive(Default)]
pub struct InMemoryJobQueue {
    entries: Mutex<VecDeque<Entry>>,
}

impl std::fmt::Debug for InMemoryJobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryJobQueue").finish()
    }
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, task_uuid: Uuid, delay: Duration) -> Result<(), JobQueueError> {
        let ready_at = std::time::Instant::now() + delay;
        self.entries
            .lock()
            .expect("in-memory job queue lock poisoned")
            .push_back(Entry { task_uuid, ready_at });
        Ok(())
    }

    async fn deliver(&self, max: usize) -> Result<Vec<Uuid>, JobQueueError> {
        let now = std::time::Instant::now();
        let mut entries = self.entries.lock().expect("in-memory job queue lock poisoned");
        let mut due = Vec::new();
        let mut remaining = VecDeque::new();
        while let Some(entry) = entries.pop_front() {
            if due.len() < max && entry.ready_at <= now {
                due.push(entry.task_uuid);
            } else {
                remaining.push_back(entry);
            }
        }
        *entries = remaining;
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn immediate_enqueue_is_deliverable_right_away() {
        let queue = InMemoryJobQueue::new();
        let task_uuid = Uuid::new_v4();
        queue.enqueue(task_uuid, Duration::ZERO).await.unwrap();
        let due = queue.deliver(10).await.unwrap();
        assert_eq!(due, vec![task_uuid]);
    }

    #[tokio::test]
    async fn delayed_enqueue_is_not_deliverable_before_delay_elapses() {
        let queue = InMemoryJobQueue::new();
        let task_uuid = Uuid::new_v4();
        queue
            .enqueue(task_uuid, Duration::from_secs(60))
            .await
            .unwrap();
        let due = queue.deliver(10).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn deliver_respects_max_batch_size() {
        let queue = InMemoryJobQueue::new();
        for _ in 0..5 {
            queue.enqueue(Uuid::new_v4(), Duration::ZERO).await.unwrap();
        }
        let due = queue.deliver(2).await.unwrap();
        assert_eq!(due.len(), 2);
        let remainder = queue.deliver(10).await.unwrap();
        assert_eq!(remainder.len(), 3);
    }
}
