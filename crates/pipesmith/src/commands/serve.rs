//! `pipesmith serve` - run the HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use pipesmith_server::{AppState, Server};
use pipesmith_store::SqliteTaskStore;

use super::BackendArgs;

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Path to the task database
    #[arg(long, default_value = "pipesmith.db")]
    pub db: PathBuf,

    #[command(flatten)]
    pub backend: BackendArgs,
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let store = Arc::new(
        SqliteTaskStore::open(&args.db)
            .with_context(|| format!("failed to open task store at {}", args.db.display()))?,
    );
    let executor = Arc::new(args.backend.executor(store.clone())?);

    let state = AppState::new(store, executor);
    Server::from_state(state)
        .run(args.bind)
        .await
        .context("server exited with an error")?;
    Ok(())
}
