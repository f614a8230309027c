//! Builder-style fixtures for `#[sqlx::test]` integration tests, in the
//! `TaskFactory::new().in_progress().create(&pool)` style.

use crate::models::{NamedStep, NamedTask, Task, TaskNamespace, WorkflowStep};
use crate::state_machine::{StepState, TaskState};
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

pub struct TaskNamespaceFactory {
    name: String,
}

impl TaskNamespaceFactory {
    pub fn new() -> Self {
        Self {
            name: format!("ns_{}", Uuid::new_v4().simple()),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub async fn create(self, pool: &PgPool) -> TaskNamespace {
        sqlx::query_as::<_, TaskNamespace>(
            "INSERT INTO task_namespaces (name) VALUES ($1) RETURNING *",
        )
        .bind(&self.name)
        .fetch_one(pool)
        .await
        .expect("insert task_namespace fixture")
    }
}

pub struct NamedTaskFactory {
    namespace_uuid: Option<Uuid>,
    name: String,
    version: String,
    context_schema: Option<Value>,
}

impl NamedTaskFactory {
    pub fn new() -> Self {
        Self {
            namespace_uuid: None,
            name: "test_task".to_string(),
            version: NamedTask::DEFAULT_VERSION.to_string(),
            context_schema: None,
        }
    }

    pub fn for_namespace(mut self, namespace_uuid: Uuid) -> Self {
        self.namespace_uuid = Some(namespace_uuid);
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.context_schema = Some(schema);
        self
    }

    pub async fn create(self, pool: &PgPool) -> NamedTask {
        let namespace_uuid = match self.namespace_uuid {
            Some(uuid) => uuid,
            None => TaskNamespaceFactory::new().create(pool).await.uuid,
        };

        sqlx::query_as::<_, NamedTask>(
            r#"
            INSERT INTO named_tasks (task_namespace_uuid, name, version, context_schema)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(namespace_uuid)
        .bind(&self.name)
        .bind(&self.version)
        .bind(&self.context_schema)
        .fetch_one(pool)
        .await
        .expect("insert named_task fixture")
    }
}

pub struct NamedStepFactory {
    named_task_uuid: Uuid,
    name: String,
    retry_limit: i32,
    retryable: bool,
    skippable: bool,
}

impl NamedStepFactory {
    pub fn for_task(named_task_uuid: Uuid) -> Self {
        Self {
            named_task_uuid,
            name: format!("step_{}", Uuid::new_v4().simple()),
            retry_limit: 3,
            retryable: true,
            skippable: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn retry_limit(mut self, retry_limit: i32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn not_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    pub async fn create(self, pool: &PgPool) -> NamedStep {
        sqlx::query_as::<_, NamedStep>(
            r#"
            INSERT INTO named_steps (named_task_uuid, name, retry_limit, retryable, skippable)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(self.named_task_uuid)
        .bind(&self.name)
        .bind(self.retry_limit)
        .bind(self.retryable)
        .bind(self.skippable)
        .fetch_one(pool)
        .await
        .expect("insert named_step fixture")
    }
}

pub struct TaskFactory {
    named_task_uuid: Option<Uuid>,
    context: Value,
}

impl TaskFactory {
    pub fn new() -> Self {
        Self {
            named_task_uuid: None,
            context: json!({}),
        }
    }

    pub fn for_named_task(mut self, named_task_uuid: Uuid) -> Self {
        self.named_task_uuid = Some(named_task_uuid);
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub async fn create(self, pool: &PgPool) -> Task {
        let named_task_uuid = match self.named_task_uuid {
            Some(uuid) => uuid,
            None => NamedTaskFactory::new().create(pool).await.uuid,
        };
        let identity_hash = Task::identity_hash_for(named_task_uuid, &self.context);

        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (named_task_uuid, context, identity_hash)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(named_task_uuid)
        .bind(&self.context)
        .bind(&identity_hash)
        .fetch_one(pool)
        .await
        .expect("insert task fixture");

        sqlx::query("INSERT INTO task_transitions (task_uuid, to_state) VALUES ($1, $2)")
            .bind(task.uuid)
            .bind(TaskState::Pending)
            .execute(pool)
            .await
            .expect("insert initial task transition");

        task
    }
}

pub struct WorkflowStepFactory {
    task_uuid: Uuid,
    named_step_uuid: Option<Uuid>,
}

impl WorkflowStepFactory {
    pub fn for_task(task_uuid: Uuid) -> Self {
        Self {
            task_uuid,
            named_step_uuid: None,
        }
    }

    pub fn for_named_step(mut self, named_step_uuid: Uuid) -> Self {
        self.named_step_uuid = Some(named_step_uuid);
        self
    }

    pub async fn create(self, pool: &PgPool) -> WorkflowStep {
        let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE uuid = $1")
            .bind(self.task_uuid)
            .fetch_one(pool)
            .await
            .expect("fetch parent task");

        let named_step_uuid = match self.named_step_uuid {
            Some(uuid) => uuid,
            None => NamedStepFactory::for_task(task.named_task_uuid).create(pool).await.uuid,
        };

        let step = sqlx::query_as::<_, WorkflowStep>(
            r#"
            INSERT INTO workflow_steps (task_uuid, named_step_uuid)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(self.task_uuid)
        .bind(named_step_uuid)
        .fetch_one(pool)
        .await
        .expect("insert workflow_step fixture");

        sqlx::query("INSERT INTO step_transitions (step_uuid, to_state) VALUES ($1, $2)")
            .bind(step.uuid)
            .bind(StepState::Pending)
            .execute(pool)
            .await
            .expect("insert initial step transition");

        step
    }
}
