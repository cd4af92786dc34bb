//! `pipesmith run` - execute one task to completion in the foreground.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use tokio_util::sync::CancellationToken;

use pipesmith_store::{InMemoryTaskStore, SharedTaskStore, SqliteTaskStore};
use pipesmith_types::{CapabilityRole, StepOutcome, Submission, Task, TaskStatus};

use super::BackendArgs;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Target repository URL
    #[arg(long)]
    pub repo: String,

    /// Base branch
    #[arg(long, default_value = "main")]
    pub branch: String,

    /// Capability binding as role=id (repeatable), e.g. repo_scanner=scan-7
    #[arg(long = "capability", value_name = "ROLE=ID")]
    pub capabilities: Vec<String>,

    /// Caller-supplied task id
    #[arg(long)]
    pub task_id: Option<String>,

    /// Path to the task database
    #[arg(long, default_value = "pipesmith.db")]
    pub db: PathBuf,

    /// Keep no durable record of this run
    #[arg(long)]
    pub ephemeral: bool,

    /// Print the final task as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub backend: BackendArgs,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let store: SharedTaskStore = if args.ephemeral {
        Arc::new(InMemoryTaskStore::new())
    } else {
        Arc::new(
            SqliteTaskStore::open(&args.db)
                .with_context(|| format!("failed to open task store at {}", args.db.display()))?,
        )
    };
    let executor = args.backend.executor(store)?;

    let mut submission = Submission::new(&args.repo).with_branch(&args.branch);
    submission.task_id = args.task_id.clone();
    for binding in &args.capabilities {
        let (role, id) = parse_binding(binding)?;
        submission = submission.with_capability(role, id);
    }

    // Ctrl-C cancels the in-flight invocation and finalises the task.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling task");
            signal_token.cancel();
        }
    });

    let task = executor.run(&submission, cancel).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&task)?);
    } else {
        print_task(&task);
    }

    if task.status == TaskStatus::Failed {
        bail!("task {} failed", task.id);
    }
    Ok(())
}

fn parse_binding(binding: &str) -> Result<(CapabilityRole, &str)> {
    let (role, id) = binding
        .split_once('=')
        .with_context(|| format!("invalid capability binding '{}', expected role=id", binding))?;
    let role = role
        .parse::<CapabilityRole>()
        .map_err(|e| anyhow::anyhow!(e))?;
    if id.is_empty() {
        bail!("empty capability id in binding '{}'", binding);
    }
    Ok((role, id))
}

pub(crate) fn print_task(task: &Task) {
    println!("task {} [{}] {}", task.id, task.status.as_str(), task.subject);
    for step in &task.steps {
        let marker = match step.outcome {
            StepOutcome::Success if step.remediated => "~",
            StepOutcome::Success => "+",
            StepOutcome::Error => "!",
        };
        println!("  {} {}", marker, step.step);
    }
    if let Some(error) = &task.error {
        println!("error at {}: {}", error.step, error.message);
    }
}
