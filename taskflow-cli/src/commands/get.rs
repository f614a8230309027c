use sqlx::PgPool;
use taskflow_shared::database::SqlFunctionExecutor;
use taskflow_shared::retry::BackoffCalculator;
use uuid::Uuid;

pub async fn run(pool: &PgPool, task_uuid: Uuid) -> anyhow::Result<()> {
    let sql_functions = SqlFunctionExecutor::new(pool.clone(), BackoffCalculator::new(Default::default()));
    let context = sql_functions.task_execution_context(task_uuid, chrono::Utc::now()).await?;

    println!("task            {task_uuid}");
    println!("total_steps     {}", context.total_steps);
    println!("complete_steps  {}", context.complete_steps);
    println!("error_steps     {}", context.error_steps);
    println!("ready_steps     {}", context.ready_steps);
    println!("in_progress     {}", context.in_progress_steps);
    println!("completion_pct  {:.1}%", context.completion_percentage);
    println!("execution       {:?}", context.execution_status);
    println!("recommended     {:?}", context.recommended_action);
    println!("health          {:?}", context.health_status);
    Ok(())
}
