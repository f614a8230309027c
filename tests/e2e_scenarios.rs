//! End-to-end scenarios S1–S6, driving the full Coordinator/Executor/
//! Finalizer stack against a real Postgres database per test.

mod common;

use common::ScriptedStep;
use sqlx::PgPool;
use std::sync::Arc;
use taskflow_orchestration::{
    CoordinatorExit, StepDependencySpec, StepExecutor, TaskFinalizer, TaskInitializer,
    TaskSubmission, WorkflowCoordinator,
};
use taskflow_shared::config::OrchestrationConfig;
use taskflow_shared::database::SqlFunctionExecutor;
use taskflow_shared::messaging::{EventPublisher, InMemoryJobQueue, JobQueue};
use taskflow_shared::registry::{HandlerKey, HandlerRegistry};
use taskflow_shared::retry::BackoffCalculator;
use taskflow_shared::state_machine::{StepState, TaskState};
use taskflow_shared::testing::factories::{NamedStepFactory, NamedTaskFactory, TaskNamespaceFactory};
use uuid::Uuid;

struct Harness {
    pool: PgPool,
    coordinator: WorkflowCoordinator,
    finalizer: TaskFinalizer,
}

impl Harness {
    fn new(pool: PgPool, registry: Arc<HandlerRegistry>) -> Self {
        let orchestration = OrchestrationConfig {
            max_coordinator_iterations: 100,
            ..OrchestrationConfig::default()
        };
        let events = EventPublisher::default();
        let sql_functions = SqlFunctionExecutor::new(pool.clone(), BackoffCalculator::new(Default::default()));
        let executor = Arc::new(StepExecutor::new(
            pool.clone(),
            registry,
            BackoffCalculator::new(Default::default()),
            events.clone(),
        ));
        let coordinator = WorkflowCoordinator::new(pool.clone(), sql_functions.clone(), executor, orchestration.clone());
        let job_queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        let finalizer = TaskFinalizer::new(pool.clone(), sql_functions, job_queue, events, orchestration);

        Self { pool, coordinator, finalizer }
    }

    /// Drive a task to a terminal `CoordinatorExit`, retrying the drive loop
    /// across backoff windows the single iteration budget couldn't absorb.
    async fn drive_to_settled(&self, task_uuid: Uuid) -> CoordinatorExit {
        loop {
            let exit = self.coordinator.drive(task_uuid).await.expect("coordinator drive");
            match exit {
                CoordinatorExit::ReadyToFinalize | CoordinatorExit::BlockedByFailures { .. } => {
                    self.finalizer.handle(task_uuid, exit).await.expect("finalize");
                    return exit;
                }
                CoordinatorExit::WaitForProcessing
                | CoordinatorExit::ClaimRaceLost
                | CoordinatorExit::WaitForDependencies
                | CoordinatorExit::IterationBudgetExhausted => {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
            }
        }
    }

    async fn task_state(&self, task_uuid: Uuid) -> TaskState {
        sqlx::query_scalar("SELECT to_state FROM task_transitions WHERE task_uuid = $1 AND most_recent")
            .bind(task_uuid)
            .fetch_one(&self.pool)
            .await
            .expect("task state")
    }

    async fn step_state(&self, step_uuid: Uuid) -> StepState {
        sqlx::query_scalar("SELECT to_state FROM step_transitions WHERE step_uuid = $1 AND most_recent")
            .bind(step_uuid)
            .fetch_one(&self.pool)
            .await
            .expect("step state")
    }

    async fn step_uuid(&self, task_uuid: Uuid, step_name: &str) -> Uuid {
        sqlx::query_scalar(
            "SELECT ws.uuid FROM workflow_steps ws JOIN named_steps ns ON ns.uuid = ws.named_step_uuid \
             WHERE ws.task_uuid = $1 AND ns.name = $2",
        )
        .bind(task_uuid)
        .bind(step_name)
        .fetch_one(&self.pool)
        .await
        .expect("step uuid")
    }
}

/// S1 — Linear happy path: A -> B -> C, each succeeds on the first attempt.
#[sqlx::test(migrator = "taskflow_shared::database::migrator::MIGRATOR")]
async fn s1_linear_happy_path(pool: PgPool) {
    let namespace = TaskNamespaceFactory::new().create(&pool).await;
    let named_task = NamedTaskFactory::new().for_namespace(namespace.uuid).create(&pool).await;
    NamedStepFactory::for_task(named_task.uuid).named("a").create(&pool).await;
    NamedStepFactory::for_task(named_task.uuid).named("b").create(&pool).await;
    NamedStepFactory::for_task(named_task.uuid).named("c").create(&pool).await;

    let registry = Arc::new(HandlerRegistry::new());
    let key = HandlerKey::new(namespace.name.clone(), named_task.name.clone(), named_task.version.clone());
    registry
        .register(
            key,
            None,
            vec![
                ScriptedStep::always_succeeds("a"),
                ScriptedStep::always_succeeds("b"),
                ScriptedStep::always_succeeds("c"),
            ],
        )
        .unwrap();

    let harness = Harness::new(pool.clone(), registry);

    let task_uuid = TaskInitializer::submit(
        &pool,
        TaskSubmission {
            named_task_uuid: named_task.uuid,
            context: serde_json::json!({}),
            priority: 0,
            correlation_id: Uuid::new_v4(),
            parent_correlation_id: None,
            steps: vec![
                StepDependencySpec { step_name: "a".into(), depends_on: vec![] },
                StepDependencySpec { step_name: "b".into(), depends_on: vec!["a".into()] },
                StepDependencySpec { step_name: "c".into(), depends_on: vec!["b".into()] },
            ],
        },
    )
    .await
    .unwrap();

    let exit = harness.drive_to_settled(task_uuid).await;
    assert_eq!(exit, CoordinatorExit::ReadyToFinalize);
    assert_eq!(harness.task_state(task_uuid).await, TaskState::Complete);

    for name in ["a", "b", "c"] {
        let step_uuid = harness.step_uuid(task_uuid, name).await;
        assert_eq!(harness.step_state(step_uuid).await, StepState::Complete);
    }
}

/// S3 — Permanent failure blocks downstream: A -> B -> C, B fails permanently.
#[sqlx::test(migrator = "taskflow_shared::database::migrator::MIGRATOR")]
async fn s3_permanent_failure_blocks_downstream(pool: PgPool) {
    let namespace = TaskNamespaceFactory::new().create(&pool).await;
    let named_task = NamedTaskFactory::new().for_namespace(namespace.uuid).create(&pool).await;
    NamedStepFactory::for_task(named_task.uuid).named("a").create(&pool).await;
    NamedStepFactory::for_task(named_task.uuid).named("b").not_retryable().create(&pool).await;
    NamedStepFactory::for_task(named_task.uuid).named("c").create(&pool).await;

    let registry = Arc::new(HandlerRegistry::new());
    let key = HandlerKey::new(namespace.name.clone(), named_task.name.clone(), named_task.version.clone());
    registry
        .register(
            key,
            None,
            vec![
                ScriptedStep::always_succeeds("a"),
                ScriptedStep::always_fails_permanently("b"),
                ScriptedStep::always_succeeds("c"),
            ],
        )
        .unwrap();

    let harness = Harness::new(pool.clone(), registry);

    let task_uuid = TaskInitializer::submit(
        &pool,
        TaskSubmission {
            named_task_uuid: named_task.uuid,
            context: serde_json::json!({}),
            priority: 0,
            correlation_id: Uuid::new_v4(),
            parent_correlation_id: None,
            steps: vec![
                StepDependencySpec { step_name: "a".into(), depends_on: vec![] },
                StepDependencySpec { step_name: "b".into(), depends_on: vec!["a".into()] },
                StepDependencySpec { step_name: "c".into(), depends_on: vec!["b".into()] },
            ],
        },
    )
    .await
    .unwrap();

    let exit = harness.drive_to_settled(task_uuid).await;
    assert!(matches!(exit, CoordinatorExit::BlockedByFailures { .. }));
    assert_eq!(harness.task_state(task_uuid).await, TaskState::Error);

    let step_b = harness.step_uuid(task_uuid, "b").await;
    assert_eq!(harness.step_state(step_b).await, StepState::Error);

    let step_c = harness.step_uuid(task_uuid, "c").await;
    assert_eq!(harness.step_state(step_c).await, StepState::Pending);
}

/// S2 — Diamond with one retry: A -> {B, C} -> D, B fails transiently once
/// then succeeds on retry; D only runs once both B and C have completed.
#[sqlx::test(migrator = "taskflow_shared::database::migrator::MIGRATOR")]
async fn s2_diamond_with_one_retry(pool: PgPool) {
    let namespace = TaskNamespaceFactory::new().create(&pool).await;
    let named_task = NamedTaskFactory::new().for_namespace(namespace.uuid).create(&pool).await;
    NamedStepFactory::for_task(named_task.uuid).named("a").create(&pool).await;
    NamedStepFactory::for_task(named_task.uuid).named("b").create(&pool).await;
    NamedStepFactory::for_task(named_task.uuid).named("c").create(&pool).await;
    NamedStepFactory::for_task(named_task.uuid).named("d").create(&pool).await;

    let registry = Arc::new(HandlerRegistry::new());
    let key = HandlerKey::new(namespace.name.clone(), named_task.name.clone(), named_task.version.clone());
    let step_b = ScriptedStep::fails_then_succeeds("b", 1);
    registry
        .register(
            key,
            None,
            vec![
                ScriptedStep::always_succeeds("a"),
                step_b.clone(),
                ScriptedStep::always_succeeds("c"),
                ScriptedStep::always_succeeds("d"),
            ],
        )
        .unwrap();

    let harness = Harness::new(pool.clone(), registry);

    let task_uuid = TaskInitializer::submit(
        &pool,
        TaskSubmission {
            named_task_uuid: named_task.uuid,
            context: serde_json::json!({}),
            priority: 0,
            correlation_id: Uuid::new_v4(),
            parent_correlation_id: None,
            steps: vec![
                StepDependencySpec { step_name: "a".into(), depends_on: vec![] },
                StepDependencySpec { step_name: "b".into(), depends_on: vec!["a".into()] },
                StepDependencySpec { step_name: "c".into(), depends_on: vec!["a".into()] },
                StepDependencySpec { step_name: "d".into(), depends_on: vec!["b".into(), "c".into()] },
            ],
        },
    )
    .await
    .unwrap();

    let exit = harness.drive_to_settled(task_uuid).await;
    assert_eq!(exit, CoordinatorExit::ReadyToFinalize);
    assert_eq!(harness.task_state(task_uuid).await, TaskState::Complete);
    assert_eq!(step_b.attempts(), 2, "b must fail once before succeeding on retry");

    for name in ["a", "b", "c", "d"] {
        let step_uuid = harness.step_uuid(task_uuid, name).await;
        assert_eq!(harness.step_state(step_uuid).await, StepState::Complete);
    }
}

/// S4 — Retry exhaustion: a step that always fails transiently burns through
/// its retry budget and the task settles as blocked, not stuck retrying forever.
#[sqlx::test(migrator = "taskflow_shared::database::migrator::MIGRATOR")]
async fn s4_retry_exhaustion_blocks_task(pool: PgPool) {
    let namespace = TaskNamespaceFactory::new().create(&pool).await;
    let named_task = NamedTaskFactory::new().for_namespace(namespace.uuid).create(&pool).await;
    NamedStepFactory::for_task(named_task.uuid).named("a").retry_limit(2).create(&pool).await;

    let registry = Arc::new(HandlerRegistry::new());
    let key = HandlerKey::new(namespace.name.clone(), named_task.name.clone(), named_task.version.clone());
    let step = ScriptedStep::new("a", |_attempt| {
        taskflow_shared::registry::StepOutcome::TransientFailure { reason: "downstream unavailable".into() }
    });
    registry.register(key, None, vec![step.clone()]).unwrap();

    let harness = Harness::new(pool.clone(), registry);

    let task_uuid = TaskInitializer::submit(
        &pool,
        TaskSubmission {
            named_task_uuid: named_task.uuid,
            context: serde_json::json!({}),
            priority: 0,
            correlation_id: Uuid::new_v4(),
            parent_correlation_id: None,
            steps: vec![StepDependencySpec { step_name: "a".into(), depends_on: vec![] }],
        },
    )
    .await
    .unwrap();

    let exit = harness.drive_to_settled(task_uuid).await;
    assert!(matches!(exit, CoordinatorExit::BlockedByFailures { .. }));
    assert_eq!(harness.task_state(task_uuid).await, TaskState::Error);

    let step_uuid = harness.step_uuid(task_uuid, "a").await;
    assert_eq!(harness.step_state(step_uuid).await, StepState::Error);
    // retry_limit=2: attempts 1 and 2 both fail and exhaust the budget, attempt 2 == retry_limit.
    assert_eq!(step.attempts(), 2);
}

/// S5 — Server-requested backoff: the handler's requested window is honored
/// over the exponential default, so the step does not become ready again
/// until that window elapses.
#[sqlx::test(migrator = "taskflow_shared::database::migrator::MIGRATOR")]
async fn s5_server_requested_backoff_is_honored(pool: PgPool) {
    let namespace = TaskNamespaceFactory::new().create(&pool).await;
    let named_task = NamedTaskFactory::new().for_namespace(namespace.uuid).create(&pool).await;
    NamedStepFactory::for_task(named_task.uuid).named("a").retry_limit(3).create(&pool).await;

    let registry = Arc::new(HandlerRegistry::new());
    let key = HandlerKey::new(namespace.name.clone(), named_task.name.clone(), named_task.version.clone());
    let step = common::ScriptedStep::new("a", |attempt| {
        if attempt == 1 {
            taskflow_shared::registry::StepOutcome::RequestBackoff { seconds: 2, reason: "slow downstream".into() }
        } else {
            taskflow_shared::registry::StepOutcome::Complete { result: serde_json::json!({"ok": true}) }
        }
    });
    registry.register(key, None, vec![step.clone()]).unwrap();

    let harness = Harness::new(pool.clone(), registry);

    let task_uuid = TaskInitializer::submit(
        &pool,
        TaskSubmission {
            named_task_uuid: named_task.uuid,
            context: serde_json::json!({}),
            priority: 0,
            correlation_id: Uuid::new_v4(),
            parent_correlation_id: None,
            steps: vec![StepDependencySpec { step_name: "a".into(), depends_on: vec![] }],
        },
    )
    .await
    .unwrap();

    // First pass: the step fails and requests a 2s backoff window.
    harness.coordinator.drive(task_uuid).await.unwrap();
    let step_uuid = harness.step_uuid(task_uuid, "a").await;
    assert_eq!(harness.step_state(step_uuid).await, StepState::Error);
    assert_eq!(step.attempts(), 1);

    // Immediately re-driving must not re-execute before the window elapses.
    harness.coordinator.drive(task_uuid).await.unwrap();
    assert_eq!(step.attempts(), 1);

    tokio::time::sleep(std::time::Duration::from_millis(2100)).await;
    let exit = harness.drive_to_settled(task_uuid).await;
    assert_eq!(exit, CoordinatorExit::ReadyToFinalize);
    assert_eq!(step.attempts(), 2);
}

/// S6 — Concurrent claim race: two executors race to claim the same ready
/// step; exactly one wins, the loser observes a benign no-op.
#[sqlx::test(migrator = "taskflow_shared::database::migrator::MIGRATOR")]
async fn s6_concurrent_claim_race_has_exactly_one_winner(pool: PgPool) {
    let namespace = TaskNamespaceFactory::new().create(&pool).await;
    let named_task = NamedTaskFactory::new().for_namespace(namespace.uuid).create(&pool).await;
    NamedStepFactory::for_task(named_task.uuid).named("a").create(&pool).await;

    let registry = Arc::new(HandlerRegistry::new());
    let key = HandlerKey::new(namespace.name.clone(), named_task.name.clone(), named_task.version.clone());
    let step = ScriptedStep::always_succeeds("a");
    registry.register(key.clone(), None, vec![step.clone()]).unwrap();

    let task_uuid = TaskInitializer::submit(
        &pool,
        TaskSubmission {
            named_task_uuid: named_task.uuid,
            context: serde_json::json!({}),
            priority: 0,
            correlation_id: Uuid::new_v4(),
            parent_correlation_id: None,
            steps: vec![StepDependencySpec { step_name: "a".into(), depends_on: vec![] }],
        },
    )
    .await
    .unwrap();

    let events = EventPublisher::default();
    let backoff = BackoffCalculator::new(Default::default());
    let executor_one = StepExecutor::new(pool.clone(), registry.clone(), backoff, events.clone());
    let backoff_two = BackoffCalculator::new(Default::default());
    let executor_two = StepExecutor::new(pool.clone(), registry.clone(), backoff_two, events);

    let step_uuid = sqlx::query_scalar::<_, Uuid>("SELECT uuid FROM workflow_steps WHERE task_uuid = $1")
        .bind(task_uuid)
        .fetch_one(&pool)
        .await
        .unwrap();

    let target = |step_uuid| taskflow_orchestration::StepClaimTarget {
        task_uuid,
        step_uuid,
        step_name: "a".to_string(),
        handler_key: key.clone(),
        task_context: serde_json::json!({}),
    };

    let (first, second) = tokio::join!(
        executor_one.claim_and_execute(target(step_uuid)),
        executor_two.claim_and_execute(target(step_uuid)),
    );

    let winners = [first.unwrap(), second.unwrap()].into_iter().filter(|r| r.is_some()).count();
    assert_eq!(winners, 1, "exactly one racer should win the claim");
    assert_eq!(step.attempts(), 1, "the handler runs exactly once per successful claim");
}
