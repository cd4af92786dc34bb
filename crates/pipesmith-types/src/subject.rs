//! Target subject: the repository and revision a task operates on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised when a subject reference cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubjectError {
    #[error("invalid repository URL '{0}': expected https://github.com/owner/repo or git@github.com:owner/repo")]
    InvalidUrl(String),
}

/// The target of one task: a repository plus the revision the generated
/// pipeline is based on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Original repository URL as submitted.
    pub repo_url: String,
    /// Repository owner (user or organisation).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Base branch the change request targets.
    pub branch: String,
}

impl Subject {
    /// Parse a subject from a repository URL and branch name.
    ///
    /// Accepts `https://github.com/owner/repo` and `git@github.com:owner/repo`
    /// forms, with or without a trailing `.git` / slash.
    pub fn parse(repo_url: &str, branch: &str) -> Result<Self, SubjectError> {
        let cleaned = repo_url.trim_end_matches('/').trim_end_matches(".git");

        let path = if let Some(rest) = cleaned.strip_prefix("https://github.com/") {
            rest
        } else if let Some(rest) = cleaned.strip_prefix("git@github.com:") {
            rest
        } else {
            return Err(SubjectError::InvalidUrl(repo_url.to_string()));
        };

        let mut parts = path.split('/');
        let (owner, repo) = match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
                (owner, repo)
            }
            _ => return Err(SubjectError::InvalidUrl(repo_url.to_string())),
        };

        Ok(Self {
            repo_url: repo_url.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
        })
    }

    /// `owner/repo` shorthand.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)
    }
}
