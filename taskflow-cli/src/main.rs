//! `taskflow-cli`: submit, inspect, cancel, and introspect tasks against a
//! taskflow database directly. There is no server process — the Core is a
//! library, and this binary links it the same way an embedding application
//! would.

mod commands;

use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "taskflow-cli", about = "Command-line interface for the taskflow orchestration core")]
struct Cli {
    #[arg(long, env = "TASKFLOW_DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit a new task from a JSON submission file.
    Submit {
        #[arg(long)]
        file: PathBuf,
    },
    /// Print a task's current execution context.
    Get {
        #[arg(long)]
        task_uuid: Uuid,
    },
    /// Cancel a task and its non-terminal steps.
    Cancel {
        #[arg(long)]
        task_uuid: Uuid,
    },
    /// List registered task templates.
    ListHandlers,
    /// Print a task's step DAG.
    Graph {
        #[arg(long)]
        task_uuid: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let pool = PgPoolOptions::new().max_connections(5).connect(&cli.database_url).await?;

    match cli.command {
        Command::Submit { file } => commands::run_submit(&pool, &file).await?,
        Command::Get { task_uuid } => commands::run_get(&pool, task_uuid).await?,
        Command::Cancel { task_uuid } => commands::run_cancel(&pool, task_uuid).await?,
        Command::ListHandlers => commands::run_list_handlers(&pool).await?,
        Command::Graph { task_uuid } => commands::run_graph(&pool, task_uuid).await?,
    }

    Ok(())
}
