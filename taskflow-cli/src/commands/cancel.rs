use sqlx::PgPool;
use taskflow_shared::state_machine::{StepEvent, StepState, StepStateMachine, TaskEvent, TaskState, TaskStateMachine};
use uuid::Uuid;

/// Cancel a task and every one of its non-terminal steps. Each transition is
/// its own guarded, append-only write — a step already complete or already
/// cancelled is left untouched.
pub async fn run(pool: &PgPool, task_uuid: Uuid) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    let task_state: TaskState =
        sqlx::query_scalar("SELECT to_state FROM task_transitions WHERE task_uuid = $1 AND most_recent")
            .bind(task_uuid)
            .fetch_one(&mut *tx)
            .await?;

    let next_task_state = TaskStateMachine::apply(task_uuid, task_state, TaskEvent::Cancel)?;
    if next_task_state != task_state {
        sqlx::query("UPDATE task_transitions SET most_recent = false WHERE task_uuid = $1 AND most_recent")
            .bind(task_uuid)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO task_transitions (uuid, task_uuid, from_state, to_state, most_recent) VALUES ($1, $2, $3, $4, true)",
        )
        .bind(Uuid::new_v4())
        .bind(task_uuid)
        .bind(task_state)
        .bind(next_task_state)
        .execute(&mut *tx)
        .await?;
    }

    let step_states: Vec<(Uuid, StepState)> = sqlx::query_as(
        r#"
        SELECT ws.uuid, st.to_state
        FROM workflow_steps ws
        JOIN step_transitions st ON st.step_uuid = ws.uuid AND st.most_recent
        WHERE ws.task_uuid = $1
        "#,
    )
    .bind(task_uuid)
    .fetch_all(&mut *tx)
    .await?;

    for (step_uuid, step_state) in step_states {
        let Ok(next_step_state) = StepStateMachine::apply(step_uuid, step_state, StepEvent::Cancel) else {
            continue;
        };
        if next_step_state == step_state {
            continue;
        }

        sqlx::query("UPDATE step_transitions SET most_recent = false WHERE step_uuid = $1 AND most_recent")
            .bind(step_uuid)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO step_transitions (uuid, step_uuid, from_state, to_state, most_recent) VALUES ($1, $2, $3, $4, true)",
        )
        .bind(Uuid::new_v4())
        .bind(step_uuid)
        .bind(step_state)
        .bind(next_step_state)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    println!("cancelled {task_uuid}");
    Ok(())
}
