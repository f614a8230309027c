//! Step-Readiness Query and Task Execution Context Aggregator, both
//! realized as single, idempotent, side-effect-free reads executed through
//! `SqlFunctionExecutor`.

use crate::error::{CoreError, Result};
use crate::resilience::{CircuitBreaker, CircuitBreakerBehavior, CircuitBreakerConfig};
use crate::retry::BackoffCalculator;
use crate::state_machine::StepState;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Raw per-step readiness facts as read from the database in one query: the
/// step's current state, its attempt bookkeeping, and whether every
/// dependency edge into it is satisfied. `retry_eligible`/`next_retry_at`
/// are computed afterward by `BackoffCalculator` so the backoff formula has
/// one home instead of being duplicated in SQL.
#[derive(Debug, Clone, sqlx::FromRow)]
struct StepReadinessRow {
    step_uuid: Uuid,
    named_step_uuid: Uuid,
    current_state: StepState,
    attempts: i32,
    retry_limit: i32,
    retryable: bool,
    backoff_request_seconds: Option<i64>,
    last_attempted_at: Option<DateTime<Utc>>,
    dependencies_satisfied: bool,
}

#[derive(Debug, Clone)]
pub struct StepReadiness {
    pub step_uuid: Uuid,
    pub named_step_uuid: Uuid,
    pub current_state: StepState,
    pub attempts: i32,
    pub retry_limit: i32,
    pub dependencies_satisfied: bool,
    pub retry_eligible: bool,
    pub ready_for_execution: bool,
    pub next_retry_at: Option<DateTime<Utc>>,
    /// An `Error` step with no retry budget left: it will never become
    /// ready again on its own and is what blocks a task's dependents.
    pub exhausted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    HasReadySteps,
    Processing,
    BlockedByFailures,
    AllComplete,
    WaitingForDependencies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendedAction {
    ExecuteReadySteps,
    WaitForCompletion,
    WaitForDependencies,
    HandleFailures,
    FinalizeTask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Blocked,
}

#[derive(Debug, Clone)]
pub struct TaskExecutionContext {
    pub task_uuid: Uuid,
    pub total_steps: i64,
    pub complete_steps: i64,
    pub error_steps: i64,
    pub ready_steps: i64,
    pub in_progress_steps: i64,
    pub execution_status: ExecutionStatus,
    pub recommended_action: RecommendedAction,
    pub completion_percentage: f64,
    pub health_status: HealthStatus,
}

/// Executes the two read-only aggregate queries the Coordinator and
/// Executor depend on. Holding this as a struct (rather than free functions)
/// leaves room for a circuit breaker around these calls in production.
#[derive(Debug, Clone)]
pub struct SqlFunctionExecutor {
    pool: PgPool,
    backoff: BackoffCalculator,
    breaker: Arc<CircuitBreaker>,
}

impl SqlFunctionExecutor {
    pub fn new(pool: PgPool, backoff: BackoffCalculator) -> Self {
        Self {
            pool,
            backoff,
            breaker: Arc::new(CircuitBreaker::new("task_readiness".to_string(), CircuitBreakerConfig::default())),
        }
    }

    /// Step-readiness query for every step in `task_uuid`'s DAG.
    /// One SQL statement: it left-joins each step's `most_recent`
    /// transition for `current_state`, and aggregates `step_edges` against
    /// dependents' `most_recent` transitions to compute
    /// `dependencies_satisfied`. Side-effect-free and safe to call from any
    /// number of concurrent Coordinator iterations.
    pub async fn step_readiness(&self, task_uuid: Uuid, now: DateTime<Utc>) -> Result<Vec<StepReadiness>> {
        if !self.breaker.should_allow() {
            return Err(CoreError::CircuitOpen { component: "task_readiness" });
        }

        let started = Instant::now();
        let result = self.run_step_readiness(task_uuid).await;
        match &result {
            Ok(_) => self.breaker.record_success(started.elapsed()),
            Err(_) => self.breaker.record_failure(started.elapsed()),
        }

        Ok(result?
            .into_iter()
            .map(|row| self.finish_readiness(row, now))
            .collect())
    }

    async fn run_step_readiness(&self, task_uuid: Uuid) -> Result<Vec<StepReadinessRow>> {
        let rows = sqlx::query_as::<_, StepReadinessRow>(
            r#"
            WITH current_step_state AS (
                SELECT DISTINCT ON (st.step_uuid) st.step_uuid, st.to_state AS current_state
                FROM step_transitions st
                WHERE st.most_recent
            ),
            dependency_satisfaction AS (
                SELECT
                    e.to_step_uuid AS step_uuid,
                    bool_and(ds.current_state IN ('complete', 'skipped', 'resolved_manually')) AS satisfied
                FROM step_edges e
                JOIN current_step_state ds ON ds.step_uuid = e.from_step_uuid
                GROUP BY e.to_step_uuid
            )
            SELECT
                ws.uuid AS step_uuid,
                ws.named_step_uuid,
                COALESCE(css.current_state, 'pending') AS current_state,
                ws.attempts,
                ns.retry_limit,
                ns.retryable,
                ws.backoff_request_seconds,
                ws.last_attempted_at,
                COALESCE(sat.satisfied, true) AS dependencies_satisfied
            FROM workflow_steps ws
            JOIN named_steps ns ON ns.uuid = ws.named_step_uuid
            LEFT JOIN current_step_state css ON css.step_uuid = ws.uuid
            LEFT JOIN dependency_satisfaction sat ON sat.step_uuid = ws.uuid
            WHERE ws.task_uuid = $1
            "#,
        )
        .bind(task_uuid)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    fn finish_readiness(&self, row: StepReadinessRow, now: DateTime<Utc>) -> StepReadiness {
        let attempts_remain = row.attempts < row.retry_limit;
        let first_attempt_or_retryable = row.attempts == 0 || row.retryable;
        let backoff_elapsed = match row.last_attempted_at {
            Some(last) => self.backoff.backoff_elapsed(
                last,
                row.attempts,
                row.backoff_request_seconds,
                now,
            ),
            None => true,
        };

        let retry_eligible = matches!(row.current_state, StepState::Pending | StepState::Error)
            && attempts_remain
            && first_attempt_or_retryable
            && backoff_elapsed;

        let ready_for_execution =
            row.dependencies_satisfied && retry_eligible && !row.current_state.is_terminal();

        let next_retry_at = row.last_attempted_at.map(|last| {
            self.backoff.next_retry_at(
                last,
                row.attempts,
                row.backoff_request_seconds,
                0.0,
            )
        });

        let exhausted = row.current_state == StepState::Error && !retry_eligible;

        StepReadiness {
            step_uuid: row.step_uuid,
            named_step_uuid: row.named_step_uuid,
            current_state: row.current_state,
            attempts: row.attempts,
            retry_limit: row.retry_limit,
            dependencies_satisfied: row.dependencies_satisfied,
            retry_eligible,
            ready_for_execution,
            next_retry_at,
            exhausted,
        }
    }

    /// Task Execution Context Aggregator: folds the per-step
    /// readiness view into one task-level recommendation.
    pub async fn task_execution_context(&self, task_uuid: Uuid, now: DateTime<Utc>) -> Result<TaskExecutionContext> {
        let steps = self.step_readiness(task_uuid, now).await?;
        if steps.is_empty() {
            return Err(CoreError::NotFound {
                entity: "task",
                entity_uuid: task_uuid,
            });
        }

        let total_steps = steps.len() as i64;
        let complete_steps = steps
            .iter()
            .filter(|s| s.current_state.satisfies_dependency())
            .count() as i64;
        let error_steps = steps
            .iter()
            .filter(|s| s.current_state == StepState::Error)
            .count() as i64;
        let in_progress_steps = steps
            .iter()
            .filter(|s| s.current_state == StepState::InProgress)
            .count() as i64;
        let ready_steps = steps.iter().filter(|s| s.ready_for_execution).count() as i64;
        let blocked_errors = steps
            .iter()
            .filter(|s| s.current_state == StepState::Error && !s.retry_eligible)
            .count() as i64;

        let execution_status = if complete_steps == total_steps {
            ExecutionStatus::AllComplete
        } else if ready_steps > 0 {
            ExecutionStatus::HasReadySteps
        } else if in_progress_steps > 0 {
            ExecutionStatus::Processing
        } else if blocked_errors > 0 {
            ExecutionStatus::BlockedByFailures
        } else {
            ExecutionStatus::WaitingForDependencies
        };

        let recommended_action = match execution_status {
            ExecutionStatus::HasReadySteps => RecommendedAction::ExecuteReadySteps,
            ExecutionStatus::Processing => RecommendedAction::WaitForCompletion,
            ExecutionStatus::WaitingForDependencies => RecommendedAction::WaitForDependencies,
            ExecutionStatus::BlockedByFailures => RecommendedAction::HandleFailures,
            ExecutionStatus::AllComplete => RecommendedAction::FinalizeTask,
        };

        let health_status = if blocked_errors > 0 {
            HealthStatus::Blocked
        } else if error_steps > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let completion_percentage = (complete_steps as f64 / total_steps as f64) * 100.0;

        Ok(TaskExecutionContext {
            task_uuid,
            total_steps,
            complete_steps,
            error_steps,
            ready_steps,
            in_progress_steps,
            execution_status,
            recommended_action,
            completion_percentage,
            health_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row(
        state: StepState,
        attempts: i32,
        retry_limit: i32,
        retryable: bool,
        deps_satisfied: bool,
        last_attempted_at: Option<DateTime<Utc>>,
        backoff_request_seconds: Option<i64>,
    ) -> StepReadinessRow {
        StepReadinessRow {
            step_uuid: Uuid::new_v4(),
            named_step_uuid: Uuid::new_v4(),
            current_state: state,
            attempts,
            retry_limit,
            retryable,
            backoff_request_seconds,
            last_attempted_at,
            dependencies_satisfied: deps_satisfied,
        }
    }

    fn executor() -> SqlFunctionExecutor {
        // Tests that need `finish_readiness` don't touch the pool; it is
        // never used outside `step_readiness`/`task_execution_context`.
        SqlFunctionExecutor {
            pool: sqlx::PgPool::connect_lazy("postgres://localhost/unused").unwrap(),
            backoff: BackoffCalculator::new(Default::default()),
            breaker: Arc::new(CircuitBreaker::new("task_readiness".to_string(), CircuitBreakerConfig::default())),
        }
    }

    #[test]
    fn pending_step_with_satisfied_deps_is_ready() {
        let exec = executor();
        let r = row(StepState::Pending, 0, 3, true, true, None, None);
        let readiness = exec.finish_readiness(r, Utc::now());
        assert!(readiness.ready_for_execution);
    }

    #[test]
    fn pending_step_with_unsatisfied_deps_is_not_ready() {
        let exec = executor();
        let r = row(StepState::Pending, 0, 3, true, false, None, None);
        let readiness = exec.finish_readiness(r, Utc::now());
        assert!(!readiness.ready_for_execution);
    }

    #[test]
    fn error_step_within_backoff_window_is_not_retry_eligible() {
        let exec = executor();
        let now = Utc::now();
        let r = row(StepState::Error, 1, 3, true, true, Some(now), None);
        let readiness = exec.finish_readiness(r, now);
        assert!(!readiness.retry_eligible);
    }

    #[test]
    fn error_step_past_backoff_window_is_retry_eligible() {
        let exec = executor();
        let now = Utc::now();
        let last = now - Duration::seconds(10);
        let r = row(StepState::Error, 1, 3, true, true, Some(last), None);
        let readiness = exec.finish_readiness(r, now);
        assert!(readiness.retry_eligible);
    }

    #[test]
    fn non_retryable_step_exhausted_after_first_failure() {
        let exec = executor();
        let now = Utc::now();
        let last = now - Duration::seconds(100);
        let r = row(StepState::Error, 1, 3, false, true, Some(last), None);
        let readiness = exec.finish_readiness(r, now);
        assert!(!readiness.retry_eligible);
    }

    #[test]
    fn attempts_at_retry_limit_plus_one_is_exhausted() {
        let exec = executor();
        let now = Utc::now();
        let last = now - Duration::seconds(100);
        let r = row(StepState::Error, 4, 3, true, true, Some(last), None);
        let readiness = exec.finish_readiness(r, now);
        assert!(!readiness.retry_eligible);
    }

    #[test]
    fn server_requested_backoff_overrides_exponential_window() {
        let exec = executor();
        let now = Utc::now();
        let last = now - Duration::seconds(5);
        // Exponential default for attempts=1 is 1s (elapsed), but the
        // handler asked for 300s.
        let r = row(StepState::Error, 1, 3, true, true, Some(last), Some(300));
        let readiness = exec.finish_readiness(r, now);
        assert!(!readiness.retry_eligible);
    }
}
