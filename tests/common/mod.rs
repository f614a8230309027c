//! Shared fixtures for the end-to-end scenario tests: in-process
//! `StepHandler`s whose outcomes are controlled by the test, so scenarios
//! don't depend on any external system beyond Postgres.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use taskflow_shared::registry::{StepHandler, StepOutcome};
use uuid::Uuid;

/// A step whose outcome is scripted by a closure, so tests can express
/// "fail twice then succeed" or "always permanently fail" directly.
pub struct ScriptedStep {
    name: String,
    attempt: AtomicUsize,
    script: Box<dyn Fn(usize) -> StepOutcome + Send + Sync>,
}

impl ScriptedStep {
    pub fn new(name: impl Into<String>, script: impl Fn(usize) -> StepOutcome + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            attempt: AtomicUsize::new(0),
            script: Box::new(script),
        })
    }

    pub fn always_succeeds(name: impl Into<String>) -> Arc<Self> {
        Self::new(name, |_| StepOutcome::Complete { result: json!({"ok": true}) })
    }

    pub fn always_fails_permanently(name: impl Into<String>) -> Arc<Self> {
        Self::new(name, |_| StepOutcome::PermanentFailure { reason: "boom".to_string() })
    }

    pub fn fails_then_succeeds(name: impl Into<String>, failures: usize) -> Arc<Self> {
        Self::new(name, move |attempt| {
            if attempt <= failures {
                StepOutcome::TransientFailure { reason: "boom".to_string() }
            } else {
                StepOutcome::Complete { result: json!({"ok": true}) }
            }
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempt.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepHandler for ScriptedStep {
    fn step_name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _task_uuid: Uuid, _step_uuid: Uuid, _context: &Value, _checkpoint: Option<&Value>) -> StepOutcome {
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        (self.script)(attempt)
    }
}
