//! `pipesmith status` - inspect a task record.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use pipesmith_store::{SqliteTaskStore, TaskStore};

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Task id to look up
    pub task_id: String,

    /// Path to the task database
    #[arg(long, default_value = "pipesmith.db")]
    pub db: PathBuf,

    /// Print the full task as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: StatusArgs) -> Result<()> {
    let store = SqliteTaskStore::open(&args.db)
        .with_context(|| format!("failed to open task store at {}", args.db.display()))?;
    let task = store.get(&args.task_id).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&task)?);
    } else {
        super::run::print_task(&task);
    }
    Ok(())
}
