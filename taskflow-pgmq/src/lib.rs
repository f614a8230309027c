//! PGMQ-backed `JobQueue`: durable, multi-consumer re-delivery
//! scheduling on top of the `pgmq` Postgres extension, for deployments that
//! need the queue to survive a worker-process crash.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskflow_shared::messaging::{JobQueue, JobQueueError};
use taskflow_shared::resilience::{CircuitBreaker, CircuitBreakerBehavior, CircuitBreakerConfig};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct DeliveryEnvelope {
    task_uuid: Uuid,
}

/// Visibility timeout for a delivered message before it becomes eligible for
/// re-delivery to another consumer if the receiver crashes mid-processing.
const VISIBILITY_TIMEOUT_SECONDS: i32 = 30;

pub struct PgmqJobQueue {
    queue: pgmq::PGMQueueExt,
    queue_name: String,
    breaker: Arc<CircuitBreaker>,
}

impl PgmqJobQueue {
    /// Connect to `database_url` and ensure `queue_name` exists.
    pub async fn connect(database_url: &str, queue_name: impl Into<String>) -> Result<Self, JobQueueError> {
        let queue = pgmq::PGMQueueExt::new(database_url.to_string(), 5)
            .await
            .map_err(|e| JobQueueError::Unavailable(e.to_string()))?;
        queue
            .init()
            .await
            .map_err(|e| JobQueueError::Unavailable(e.to_string()))?;

        let queue_name = queue_name.into();
        queue
            .create(&queue_name)
            .await
            .map_err(|e| JobQueueError::Unavailable(e.to_string()))?;

        Ok(Self {
            queue,
            queue_name,
            breaker: Arc::new(CircuitBreaker::new("job_queue".to_string(), CircuitBreakerConfig::default())),
        })
    }

    fn guard(&self) -> Result<(), JobQueueError> {
        if self.breaker.should_allow() {
            Ok(())
        } else {
            Err(JobQueueError::Unavailable(format!("circuit open for {}", self.queue_name)))
        }
    }
}

#[async_trait]
impl JobQueue for PgmqJobQueue {
    #[tracing::instrument(skip(self), fields(queue = %self.queue_name))]
    async fn enqueue(&self, task_uuid: Uuid, delay: Duration) -> Result<(), JobQueueError> {
        self.guard()?;
        let started = Instant::now();
        let envelope = DeliveryEnvelope { task_uuid };
        let result = self
            .queue
            .send_delay(&self.queue_name, &envelope, delay.as_secs() as i64)
            .await
            .map_err(|e| JobQueueError::Unavailable(e.to_string()));

        match &result {
            Ok(_) => self.breaker.record_success(started.elapsed()),
            Err(_) => self.breaker.record_failure(started.elapsed()),
        }
        result?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(queue = %self.queue_name))]
    async fn deliver(&self, max: usize) -> Result<Vec<Uuid>, JobQueueError> {
        self.guard()?;
        let started = Instant::now();
        let fetched = self
            .queue
            .read_batch::<DeliveryEnvelope>(&self.queue_name, Some(VISIBILITY_TIMEOUT_SECONDS), max as i32)
            .await
            .map_err(|e| JobQueueError::Unavailable(e.to_string()));

        let messages = match fetched {
            Ok(messages) => {
                self.breaker.record_success(started.elapsed());
                messages.unwrap_or_default()
            }
            Err(e) => {
                self.breaker.record_failure(started.elapsed());
                return Err(e);
            }
        };

        let mut due = Vec::with_capacity(messages.len());
        for message in messages {
            self.queue
                .delete(&self.queue_name, message.msg_id)
                .await
                .map_err(|e| JobQueueError::Unavailable(e.to_string()))?;
            due.push(message.message.task_uuid);
        }

        Ok(due)
    }
}
