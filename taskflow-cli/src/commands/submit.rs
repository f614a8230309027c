use serde::Deserialize;
use sqlx::PgPool;
use std::path::Path;
use taskflow_orchestration::{StepDependencySpec, TaskInitializer, TaskSubmission};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct SubmissionFile {
    named_task_uuid: Uuid,
    context: serde_json::Value,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    correlation_id: Option<Uuid>,
    #[serde(default)]
    parent_correlation_id: Option<Uuid>,
    steps: Vec<StepSpecFile>,
}

#[derive(Debug, Deserialize)]
struct StepSpecFile {
    step_name: String,
    #[serde(default)]
    depends_on: Vec<String>,
}

pub async fn run(pool: &PgPool, submission_path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(submission_path)?;
    let parsed: SubmissionFile = serde_json::from_str(&raw)?;

    let submission = TaskSubmission {
        named_task_uuid: parsed.named_task_uuid,
        context: parsed.context,
        priority: parsed.priority,
        correlation_id: parsed.correlation_id.unwrap_or_else(Uuid::new_v4),
        parent_correlation_id: parsed.parent_correlation_id,
        steps: parsed
            .steps
            .into_iter()
            .map(|s| StepDependencySpec {
                step_name: s.step_name,
                depends_on: s.depends_on,
            })
            .collect(),
    };

    let task_uuid = TaskInitializer::submit(pool, submission).await?;
    println!("{task_uuid}");
    Ok(())
}
