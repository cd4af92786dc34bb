//! Publish API trait and the GitHub-backed implementation.
//!
//! Three independent deterministic operations: create a branch, create or
//! update a file, open a change request. Each is idempotent-on-retry: the
//! remediation engine depends on being able to call them individually and
//! repeat them safely.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};

use pipesmith_types::Subject;

use crate::error::{PublishError, Result};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ─────────────────────────────────────────────────────────────────────────────
// References
// ─────────────────────────────────────────────────────────────────────────────

/// Reference to a created branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub name: String,
    /// SHA of the commit the branch points at.
    pub sha: String,
}

/// Reference to a created or updated file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub path: String,
    pub sha: String,
}

/// Reference to an opened change request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRef {
    pub number: u64,
    pub url: String,
    pub draft: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// The publish collaborator's deterministic entry points.
#[async_trait]
pub trait PublishApi: Send + Sync {
    /// Create `new_branch` from the subject's base branch. Creating a branch
    /// that already exists is success, not an error.
    async fn create_branch(&self, subject: &Subject, new_branch: &str) -> Result<BranchRef>;

    /// Create or update a file on `branch`.
    async fn create_or_update_file(
        &self,
        subject: &Subject,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<CommitRef>;

    /// Open a change request from `head` into the subject's base branch.
    async fn open_change_request(
        &self,
        subject: &Subject,
        head: &str,
        title: &str,
        body: &str,
        draft: bool,
    ) -> Result<RequestRef>;
}

/// A publisher that can be shared across executor instances.
pub type SharedPublisher = Arc<dyn PublishApi>;

// ─────────────────────────────────────────────────────────────────────────────
// GitHub implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the GitHub publisher.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub api_base: String,
    pub token: String,
    pub timeout: Duration,
}

impl PublishConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}

/// GitHub-backed [`PublishApi`] implementation.
pub struct GitHubPublisher {
    client: Client,
    config: PublishConfig,
}

impl GitHubPublisher {
    pub fn new(config: PublishConfig) -> Result<Self> {
        if config.token.is_empty() {
            return Err(PublishError::MissingToken);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("pipesmith/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PublishError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base, path)
    }

    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.token))
            .header(header::ACCEPT, "application/vnd.github.v3+json")
    }

    async fn api_error(response: reqwest::Response) -> PublishError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|e| e.message)
            .unwrap_or(body);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PublishError::Auth(message),
            _ => PublishError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// SHA of the head commit of `branch`.
    async fn branch_sha(&self, subject: &Subject, branch: &str) -> Result<String> {
        let response = self
            .add_headers(self.client.get(self.url(&format!(
                "/repos/{}/{}/git/ref/heads/{}",
                subject.owner, subject.repo, branch
            ))))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let git_ref: GitRefResponse = response
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;
        Ok(git_ref.object.sha)
    }

    /// Blob SHA of an existing file, if present on `branch`.
    async fn existing_file_sha(
        &self,
        subject: &Subject,
        branch: &str,
        path: &str,
    ) -> Result<Option<String>> {
        let response = self
            .add_headers(self.client.get(self.url(&format!(
                "/repos/{}/{}/contents/{}",
                subject.owner, subject.repo, path
            ))))
            .query(&[("ref", branch)])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let contents: ContentsResponse = response
                    .json()
                    .await
                    .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;
                Ok(Some(contents.sha))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::api_error(response).await),
        }
    }
}

#[async_trait]
impl PublishApi for GitHubPublisher {
    async fn create_branch(&self, subject: &Subject, new_branch: &str) -> Result<BranchRef> {
        let base_sha = self.branch_sha(subject, &subject.branch).await?;

        let response = self
            .add_headers(self.client.post(self.url(&format!(
                "/repos/{}/{}/git/refs",
                subject.owner, subject.repo
            ))))
            .json(&serde_json::json!({
                "ref": format!("refs/heads/{}", new_branch),
                "sha": base_sha,
            }))
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED => {
                tracing::info!(subject = %subject, branch = new_branch, "Branch created");
            }
            // The branch already exists: a recoverable conflict, not fatal.
            StatusCode::UNPROCESSABLE_ENTITY => {
                tracing::debug!(subject = %subject, branch = new_branch, "Branch already exists");
            }
            _ => return Err(Self::api_error(response).await),
        }

        Ok(BranchRef {
            name: new_branch.to_string(),
            sha: base_sha,
        })
    }

    async fn create_or_update_file(
        &self,
        subject: &Subject,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<CommitRef> {
        let existing_sha = self.existing_file_sha(subject, branch, path).await?;

        let mut body = serde_json::json!({
            "message": message,
            "content": BASE64.encode(content.as_bytes()),
            "branch": branch,
        });
        if let Some(sha) = existing_sha {
            body["sha"] = serde_json::Value::String(sha);
        }

        let response = self
            .add_headers(self.client.put(self.url(&format!(
                "/repos/{}/{}/contents/{}",
                subject.owner, subject.repo, path
            ))))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let result: PutContentsResponse = response
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;

        tracing::info!(subject = %subject, branch, path, "File committed");
        Ok(CommitRef {
            path: path.to_string(),
            sha: result.commit.sha,
        })
    }

    async fn open_change_request(
        &self,
        subject: &Subject,
        head: &str,
        title: &str,
        body: &str,
        draft: bool,
    ) -> Result<RequestRef> {
        let response = self
            .add_headers(self.client.post(self.url(&format!(
                "/repos/{}/{}/pulls",
                subject.owner, subject.repo
            ))))
            .json(&serde_json::json!({
                "title": title,
                "body": body,
                "head": head,
                "base": subject.branch,
                "draft": draft,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let pr: PullResponse = response
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;

        tracing::info!(subject = %subject, number = pr.number, draft, "Change request opened");
        Ok(RequestRef {
            number: pr.number,
            url: pr.html_url,
            draft: pr.draft,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API response types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GitRefResponse {
    object: GitRefObject,
}

#[derive(Debug, Deserialize)]
struct GitRefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    commit: CommitObject,
}

#[derive(Debug, Deserialize)]
struct CommitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
    #[serde(default)]
    draft: bool,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Recording test double
// ─────────────────────────────────────────────────────────────────────────────

/// One call observed by the [`RecordingPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: String,
    pub detail: String,
}

/// A [`PublishApi`] double that records call order and can be told to fail
/// specific operations, for exercising remediation semantics.
#[derive(Default)]
pub struct RecordingPublisher {
    calls: std::sync::Mutex<Vec<RecordedCall>>,
    failing: std::sync::Mutex<std::collections::HashSet<String>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent invocations of `operation` fail.
    pub fn fail_on(&self, operation: &str) {
        self.failing.lock().unwrap().insert(operation.to_string());
    }

    /// Calls observed so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Operation names observed so far, in order.
    pub fn operations(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.operation.clone())
            .collect()
    }

    fn record(&self, operation: &str, detail: String) -> Result<()> {
        self.calls.lock().unwrap().push(RecordedCall {
            operation: operation.to_string(),
            detail,
        });
        if self.failing.lock().unwrap().contains(operation) {
            return Err(PublishError::Api {
                status: 500,
                message: format!("simulated failure of {}", operation),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PublishApi for RecordingPublisher {
    async fn create_branch(&self, _subject: &Subject, new_branch: &str) -> Result<BranchRef> {
        self.record("create-branch", new_branch.to_string())?;
        Ok(BranchRef {
            name: new_branch.to_string(),
            sha: "0000000000000000000000000000000000000000".to_string(),
        })
    }

    async fn create_or_update_file(
        &self,
        _subject: &Subject,
        branch: &str,
        path: &str,
        _content: &str,
        _message: &str,
    ) -> Result<CommitRef> {
        self.record("create-file", format!("{}:{}", branch, path))?;
        Ok(CommitRef {
            path: path.to_string(),
            sha: "1111111111111111111111111111111111111111".to_string(),
        })
    }

    async fn open_change_request(
        &self,
        _subject: &Subject,
        head: &str,
        title: &str,
        _body: &str,
        draft: bool,
    ) -> Result<RequestRef> {
        self.record("open-change-request", format!("{}: {}", head, title))?;
        Ok(RequestRef {
            number: 1,
            url: "https://github.com/example/pull/1".to_string(),
            draft,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> Subject {
        Subject::parse("https://github.com/acme/widgets", "main").unwrap()
    }

    #[test]
    fn test_publisher_requires_token() {
        assert!(matches!(
            GitHubPublisher::new(PublishConfig::new("")),
            Err(PublishError::MissingToken)
        ));
        assert!(GitHubPublisher::new(PublishConfig::new("tok")).is_ok());
    }

    #[test]
    fn test_url_building() {
        let publisher = GitHubPublisher::new(
            PublishConfig::new("tok").with_api_base("https://ghe.example.com/api/v3"),
        )
        .unwrap();
        assert_eq!(
            publisher.url("/repos/acme/widgets/pulls"),
            "https://ghe.example.com/api/v3/repos/acme/widgets/pulls"
        );
    }

    #[tokio::test]
    async fn test_recording_publisher_orders_calls() {
        let publisher = RecordingPublisher::new();
        let s = subject();
        publisher.create_branch(&s, "feature").await.unwrap();
        publisher
            .create_or_update_file(&s, "feature", ".github/workflows/ci.yml", "name: ci", "add ci")
            .await
            .unwrap();
        publisher
            .open_change_request(&s, "feature", "Add CI", "body", true)
            .await
            .unwrap();

        assert_eq!(
            publisher.operations(),
            vec!["create-branch", "create-file", "open-change-request"]
        );
    }

    #[tokio::test]
    async fn test_recording_publisher_injected_failure() {
        let publisher = RecordingPublisher::new();
        publisher.fail_on("create-file");
        let s = subject();
        assert!(publisher.create_branch(&s, "b").await.is_ok());
        assert!(
            publisher
                .create_or_update_file(&s, "b", "p", "c", "m")
                .await
                .is_err()
        );
    }
}
