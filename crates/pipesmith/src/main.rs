//! Pipesmith - agent-driven CI/CD pipeline generation.
//!
//! Main entry point for the Pipesmith CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{run, serve, status};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Pipesmith - agent-driven CI/CD pipeline generation
#[derive(Parser)]
#[command(name = "pipesmith")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the Pipesmith server
    Serve(serve::ServeArgs),

    /// Run a single pipeline-generation task to completion
    Run(run::RunArgs),

    /// Show a task's status and step log
    Status(status::StatusArgs),
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "pipesmith=debug,pipesmith_engine=debug,pipesmith_capability=debug,info"
    } else {
        "pipesmith=info,warn"
    };
    let filter = std::env::var("PIPESMITH_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_filter.to_string());

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve(args) => serve::execute(args).await,
        Commands::Run(args) => run::execute(args).await,
        Commands::Status(args) => status::execute(args).await,
    }
}
