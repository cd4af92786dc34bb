//! Publish collaborator client for Pipesmith.
//!
//! The source-hosting provider is an external collaborator exposing three
//! independent deterministic operations: create-branch, create-or-update-file
//! and open-change-request. The remediation engine depends on each being
//! callable on its own and idempotent on retry.

mod client;
mod error;
mod secrets;

pub use client::{
    BranchRef, CommitRef, GitHubPublisher, PublishApi, PublishConfig, RecordedCall,
    RecordingPublisher, RequestRef, SharedPublisher,
};
pub use error::{PublishError, Result};
pub use secrets::{ResolvedToken, TokenSource, resolve_token};
