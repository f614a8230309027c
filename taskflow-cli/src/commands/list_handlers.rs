use sqlx::PgPool;

#[derive(Debug, sqlx::FromRow)]
struct NamedTaskRow {
    namespace: String,
    name: String,
    version: String,
    step_count: i64,
}

/// List registered task templates (namespace/name/version) and their step
/// counts. The in-process `HandlerRegistry` only exists inside a running
/// worker, so this reflects the persisted template definitions instead.
pub async fn run(pool: &PgPool) -> anyhow::Result<()> {
    let rows: Vec<NamedTaskRow> = sqlx::query_as(
        r#"
        SELECT tn.name AS namespace, nt.name, nt.version, count(ns.uuid) AS step_count
        FROM named_tasks nt
        JOIN task_namespaces tn ON tn.uuid = nt.task_namespace_uuid
        LEFT JOIN named_steps ns ON ns.named_task_uuid = nt.uuid
        GROUP BY tn.name, nt.name, nt.version
        ORDER BY tn.name, nt.name, nt.version
        "#,
    )
    .fetch_all(pool)
    .await?;

    for row in rows {
        println!("{}/{}@{}  ({} steps)", row.namespace, row.name, row.version, row.step_count);
    }
    Ok(())
}
