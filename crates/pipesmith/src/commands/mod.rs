//! CLI command implementations.

pub mod run;
pub mod serve;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use pipesmith_capability::{CapabilityConfig, HttpCapabilityClient, SharedCapabilityClient};
use pipesmith_engine::{ExecutorConfig, WorkflowExecutor};
use pipesmith_publish::{GitHubPublisher, PublishConfig, SharedPublisher, resolve_token};
use pipesmith_store::SharedTaskStore;

/// Flags shared by every command that builds an executor.
#[derive(Debug, Args)]
pub struct BackendArgs {
    /// Base URL of the capability gateway
    #[arg(long, env = "PIPESMITH_CAPABILITY_URL")]
    pub capability_url: String,

    /// Per-invocation ceiling in seconds
    #[arg(long, default_value_t = 900)]
    pub invocation_timeout: u64,

    /// Publish API base URL (defaults to the public GitHub API)
    #[arg(long, env = "PIPESMITH_PUBLISH_API")]
    pub publish_api: Option<String>,

    /// Publish token; falls back to PIPESMITH_GITHUB_TOKEN / GITHUB_TOKEN
    #[arg(long, hide_env_values = true, env = "PIPESMITH_PUBLISH_TOKEN")]
    pub publish_token: Option<String>,

    /// Open change requests ready for review instead of as drafts
    #[arg(long)]
    pub no_draft: bool,
}

impl BackendArgs {
    pub fn capability_client(&self) -> Result<SharedCapabilityClient> {
        let config = CapabilityConfig::new(&self.capability_url)
            .with_timeout(Duration::from_secs(self.invocation_timeout));
        let client =
            HttpCapabilityClient::new(config).context("failed to build capability client")?;
        Ok(Arc::new(client))
    }

    pub fn publisher(&self) -> Result<SharedPublisher> {
        let token = resolve_token(self.publish_token.as_deref())
            .context("no publish token configured (set PIPESMITH_GITHUB_TOKEN)")?;
        tracing::debug!(source = %token.source, "Publish token resolved");

        let mut config = PublishConfig::new(token.value);
        if let Some(base) = &self.publish_api {
            config = config.with_api_base(base);
        }
        let publisher = GitHubPublisher::new(config).context("failed to build publisher")?;
        Ok(Arc::new(publisher))
    }

    pub fn executor(&self, store: SharedTaskStore) -> Result<WorkflowExecutor> {
        let config = ExecutorConfig {
            draft_requests: !self.no_draft,
            ..ExecutorConfig::default()
        };
        Ok(WorkflowExecutor::new(
            store,
            self.capability_client()?,
            self.publisher()?,
            config,
        ))
    }
}
