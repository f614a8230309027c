use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
struct EdgeRow {
    from_name: String,
    to_name: String,
}

#[derive(Debug, sqlx::FromRow)]
struct StepRow {
    name: String,
    current_state: String,
}

/// Print a task's step DAG as `from -> to` edges plus each step's current
/// state, in no particular order — enough to eyeball a stuck task.
pub async fn run(pool: &PgPool, task_uuid: Uuid) -> anyhow::Result<()> {
    let steps: Vec<StepRow> = sqlx::query_as(
        r#"
        SELECT ns.name, st.to_state::text AS current_state
        FROM workflow_steps ws
        JOIN named_steps ns ON ns.uuid = ws.named_step_uuid
        JOIN step_transitions st ON st.step_uuid = ws.uuid AND st.most_recent
        WHERE ws.task_uuid = $1
        ORDER BY ns.name
        "#,
    )
    .bind(task_uuid)
    .fetch_all(pool)
    .await?;

    for step in &steps {
        println!("[{}] {}", step.current_state, step.name);
    }

    let edges: Vec<EdgeRow> = sqlx::query_as(
        r#"
        SELECT fns.name AS from_name, tns.name AS to_name
        FROM step_edges e
        JOIN workflow_steps fws ON fws.uuid = e.from_step_uuid
        JOIN named_steps fns ON fns.uuid = fws.named_step_uuid
        JOIN workflow_steps tws ON tws.uuid = e.to_step_uuid
        JOIN named_steps tns ON tns.uuid = tws.named_step_uuid
        WHERE e.task_uuid = $1
        "#,
    )
    .bind(task_uuid)
    .fetch_all(pool)
    .await?;

    for edge in &edges {
        println!("{} -> {}", edge.from_name, edge.to_name);
    }

    Ok(())
}
