//! Remediation engine: direct invocation of publish operations an agent was
//! mandated to perform but demonstrably did not.
//!
//! Pure recovery logic: no reasoning, only a fixed mapping from "operation
//! expected but missing" to a deterministic publish call. Parameters come
//! from the step's own input (the publish plan), never from agent output, so
//! remediation works even against an empty trace.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use pipesmith_capability::CapabilityInvocation;
use pipesmith_publish::{BranchRef, CommitRef, RequestRef, SharedPublisher};
use pipesmith_types::{Subject, Task};

use crate::error::RemediationError;

// ─────────────────────────────────────────────────────────────────────────────
// Operations
// ─────────────────────────────────────────────────────────────────────────────

/// The publish sub-operations, in dependency order: a file cannot be attached
/// to a non-existent branch, and a request cannot reference a branch with no
/// commits. Declaration order IS the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishOperationKind {
    CreateBranch,
    CreateFile,
    OpenChangeRequest,
}

impl PublishOperationKind {
    /// All operations in dependency order.
    pub const DEPENDENCY_ORDER: [PublishOperationKind; 3] = [
        PublishOperationKind::CreateBranch,
        PublishOperationKind::CreateFile,
        PublishOperationKind::OpenChangeRequest,
    ];

    /// The operation name as it appears in agent trace events.
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishOperationKind::CreateBranch => "create-branch",
            PublishOperationKind::CreateFile => "create-file",
            PublishOperationKind::OpenChangeRequest => "open-change-request",
        }
    }
}

impl std::fmt::Display for PublishOperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Publish plan
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic publish parameters, derived during pr-preparation from
/// earlier step payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPlan {
    /// Branch the workflow file lands on.
    pub branch: String,
    /// Repository path of the workflow file.
    pub path: String,
    /// Change request title.
    pub title: String,
    /// Change request body.
    pub body: String,
    /// Commit message for the workflow file.
    pub commit_message: String,
    /// Open the request as a draft.
    pub draft: bool,
}

impl PublishPlan {
    /// Derive the plan from the task and the validated artifact's secrets.
    pub fn derive(task: &Task, workflow_path: &str, secrets: &[String], draft: bool) -> Self {
        let mut body = format!(
            "Automatically generated CI/CD pipeline for `{}`.\n\nThe workflow at `{}` was \
             produced from an analysis of the repository on branch `{}`.\n",
            task.subject.full_name(),
            workflow_path,
            task.subject.branch
        );
        if secrets.is_empty() {
            body.push_str("\nNo repository secrets are required.\n");
        } else {
            body.push_str("\nRequired repository secrets:\n");
            for secret in secrets {
                body.push_str(&format!("- `{}`\n", secret));
            }
        }
        body.push_str(&format!("\nGeneration task: `{}`\n", task.id));

        Self {
            branch: format!("pipesmith/{}", task.id),
            path: workflow_path.to_string(),
            title: format!("Add CI/CD pipeline for {}", task.subject.repo),
            body,
            commit_message: "Add generated CI/CD pipeline workflow".to_string(),
            draft,
        }
    }
}

/// A single operation with the parameters needed to perform it directly.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedOperation {
    CreateBranch {
        branch: String,
    },
    CreateFile {
        branch: String,
        path: String,
        content: String,
        message: String,
    },
    OpenChangeRequest {
        head: String,
        title: String,
        body: String,
        draft: bool,
    },
}

impl PlannedOperation {
    pub fn kind(&self) -> PublishOperationKind {
        match self {
            PlannedOperation::CreateBranch { .. } => PublishOperationKind::CreateBranch,
            PlannedOperation::CreateFile { .. } => PublishOperationKind::CreateFile,
            PlannedOperation::OpenChangeRequest { .. } => PublishOperationKind::OpenChangeRequest,
        }
    }

    pub fn operation_name(&self) -> &'static str {
        self.kind().as_str()
    }
}

/// Expand declared operation kinds into fully-parameterised operations, in
/// dependency order regardless of the declared order.
pub fn expected_operations(
    kinds: &[PublishOperationKind],
    plan: &PublishPlan,
    content: &str,
) -> Vec<PlannedOperation> {
    let declared: HashSet<PublishOperationKind> = kinds.iter().copied().collect();

    PublishOperationKind::DEPENDENCY_ORDER
        .iter()
        .filter(|kind| declared.contains(kind))
        .map(|kind| match kind {
            PublishOperationKind::CreateBranch => PlannedOperation::CreateBranch {
                branch: plan.branch.clone(),
            },
            PublishOperationKind::CreateFile => PlannedOperation::CreateFile {
                branch: plan.branch.clone(),
                path: plan.path.clone(),
                content: content.to_string(),
                message: plan.commit_message.clone(),
            },
            PublishOperationKind::OpenChangeRequest => PlannedOperation::OpenChangeRequest {
                head: plan.branch.clone(),
                title: plan.title.clone(),
                body: plan.body.clone(),
                draft: plan.draft,
            },
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Plan computation
// ─────────────────────────────────────────────────────────────────────────────

/// The missing operations to perform directly. Transient: constructed per
/// step, discarded after execution, never persisted.
#[derive(Debug, Clone, Default)]
pub struct RemediationPlan {
    /// Missing operations, in dependency order.
    pub missing: Vec<PlannedOperation>,
}

impl RemediationPlan {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn operation_names(&self) -> Vec<&'static str> {
        self.missing.iter().map(|op| op.operation_name()).collect()
    }
}

/// Diff the expected operations against the invocation's trace.
///
/// An expected operation is satisfied only by a trace event with its name and
/// a success status; absent or failed events put it on the plan. `expected`
/// is dependency-ordered and that order is preserved.
pub fn compute_plan(
    expected: &[PlannedOperation],
    invocation: &CapabilityInvocation,
) -> RemediationPlan {
    let succeeded: HashSet<&str> = invocation.succeeded_operations().into_iter().collect();

    RemediationPlan {
        missing: expected
            .iter()
            .filter(|op| !succeeded.contains(op.operation_name()))
            .cloned()
            .collect(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────────────────────────────────────

/// An operation the remediation engine performed directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum CompletedOperation {
    CreateBranch(BranchRef),
    CreateFile(CommitRef),
    OpenChangeRequest(RequestRef),
}

impl CompletedOperation {
    pub fn operation_name(&self) -> &'static str {
        match self {
            CompletedOperation::CreateBranch(_) => PublishOperationKind::CreateBranch.as_str(),
            CompletedOperation::CreateFile(_) => PublishOperationKind::CreateFile.as_str(),
            CompletedOperation::OpenChangeRequest(_) => {
                PublishOperationKind::OpenChangeRequest.as_str()
            }
        }
    }
}

/// Executes remediation plans against the publish collaborator.
pub struct RemediationEngine {
    publisher: SharedPublisher,
}

impl RemediationEngine {
    pub fn new(publisher: SharedPublisher) -> Self {
        Self { publisher }
    }

    /// Perform the plan's operations in order, stopping at the first failure.
    ///
    /// Order is the invariant that matters here: issuing a file call before
    /// its branch call succeeds, or a request call before both, produces an
    /// externally-visible invalid state.
    pub async fn execute(
        &self,
        subject: &Subject,
        plan: &RemediationPlan,
    ) -> Result<Vec<CompletedOperation>, RemediationError> {
        let mut completed = Vec::new();

        for operation in &plan.missing {
            tracing::info!(
                subject = %subject,
                operation = operation.operation_name(),
                "Remediating missing publish operation"
            );

            let result = match operation {
                PlannedOperation::CreateBranch { branch } => self
                    .publisher
                    .create_branch(subject, branch)
                    .await
                    .map(CompletedOperation::CreateBranch),
                PlannedOperation::CreateFile {
                    branch,
                    path,
                    content,
                    message,
                } => self
                    .publisher
                    .create_or_update_file(subject, branch, path, content, message)
                    .await
                    .map(CompletedOperation::CreateFile),
                PlannedOperation::OpenChangeRequest {
                    head,
                    title,
                    body,
                    draft,
                } => self
                    .publisher
                    .open_change_request(subject, head, title, body, *draft)
                    .await
                    .map(CompletedOperation::OpenChangeRequest),
            };

            match result {
                Ok(done) => completed.push(done),
                Err(source) => {
                    return Err(RemediationError::PartialFailure {
                        completed: completed
                            .iter()
                            .map(|c| c.operation_name().to_string())
                            .collect(),
                        failed: operation.operation_name().to_string(),
                        source,
                    });
                }
            }
        }

        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesmith_capability::TraceEvent;
    use pipesmith_publish::RecordingPublisher;
    use std::sync::Arc;

    fn subject() -> Subject {
        Subject::parse("https://github.com/acme/widgets", "main").unwrap()
    }

    fn plan_fixture() -> PublishPlan {
        PublishPlan {
            branch: "pipesmith/task-1".to_string(),
            path: ".github/workflows/ci.yml".to_string(),
            title: "Add CI/CD pipeline".to_string(),
            body: "body".to_string(),
            commit_message: "Add workflow".to_string(),
            draft: true,
        }
    }

    fn all_expected() -> Vec<PlannedOperation> {
        expected_operations(
            &PublishOperationKind::DEPENDENCY_ORDER,
            &plan_fixture(),
            "name: ci",
        )
    }

    fn invocation(events: &[(&str, u16)]) -> CapabilityInvocation {
        let mut inv = CapabilityInvocation::new("pr-manager");
        for (op, status) in events {
            inv.trace_events.push(TraceEvent::new(*op, *status));
        }
        inv
    }

    #[test]
    fn test_expected_operations_dependency_order() {
        // Declared out of order; expansion still yields dependency order.
        let ops = expected_operations(
            &[
                PublishOperationKind::OpenChangeRequest,
                PublishOperationKind::CreateBranch,
                PublishOperationKind::CreateFile,
            ],
            &plan_fixture(),
            "name: ci",
        );
        let names: Vec<&str> = ops.iter().map(|o| o.operation_name()).collect();
        assert_eq!(names, vec!["create-branch", "create-file", "open-change-request"]);
    }

    #[test]
    fn test_compute_plan_all_present_is_empty() {
        let inv = invocation(&[
            ("create-branch", 201),
            ("create-file", 200),
            ("open-change-request", 201),
        ]);
        let plan = compute_plan(&all_expected(), &inv);
        assert!(plan.is_empty());

        // Idempotence: recomputing changes nothing.
        let again = compute_plan(&all_expected(), &inv);
        assert!(again.is_empty());
    }

    #[test]
    fn test_compute_plan_empty_trace_covers_everything() {
        let inv = invocation(&[]);
        let plan = compute_plan(&all_expected(), &inv);
        assert_eq!(
            plan.operation_names(),
            vec!["create-branch", "create-file", "open-change-request"]
        );
    }

    #[test]
    fn test_compute_plan_failed_status_counts_as_missing() {
        let inv = invocation(&[
            ("create-branch", 201),
            ("create-file", 500),
            ("open-change-request", 201),
        ]);
        let plan = compute_plan(&all_expected(), &inv);
        assert_eq!(plan.operation_names(), vec!["create-file"]);
    }

    #[test]
    fn test_compute_plan_partial_trace() {
        let inv = invocation(&[("create-branch", 201)]);
        let plan = compute_plan(&all_expected(), &inv);
        assert_eq!(
            plan.operation_names(),
            vec!["create-file", "open-change-request"]
        );
    }

    #[tokio::test]
    async fn test_execute_preserves_dependency_order() {
        let publisher = Arc::new(RecordingPublisher::new());
        let engine = RemediationEngine::new(publisher.clone());

        let plan = compute_plan(&all_expected(), &invocation(&[]));
        let completed = engine.execute(&subject(), &plan).await.unwrap();

        assert_eq!(
            publisher.operations(),
            vec!["create-branch", "create-file", "open-change-request"]
        );
        assert_eq!(completed.len(), 3);
    }

    #[tokio::test]
    async fn test_execute_stops_at_first_failure() {
        let publisher = Arc::new(RecordingPublisher::new());
        publisher.fail_on("create-file");
        let engine = RemediationEngine::new(publisher.clone());

        let plan = compute_plan(&all_expected(), &invocation(&[]));
        let err = engine.execute(&subject(), &plan).await.unwrap_err();

        // The change-request call is never issued after the file call fails.
        assert_eq!(publisher.operations(), vec!["create-branch", "create-file"]);
        let RemediationError::PartialFailure {
            completed, failed, ..
        } = err;
        assert_eq!(completed, vec!["create-branch"]);
        assert_eq!(failed, "create-file");
    }

    #[tokio::test]
    async fn test_execute_empty_plan_is_noop() {
        let publisher = Arc::new(RecordingPublisher::new());
        let engine = RemediationEngine::new(publisher.clone());

        let completed = engine
            .execute(&subject(), &RemediationPlan::default())
            .await
            .unwrap();
        assert!(completed.is_empty());
        assert!(publisher.operations().is_empty());
    }

    #[test]
    fn test_publish_plan_derivation() {
        let task = Task::new("task-abc", subject());
        let plan = PublishPlan::derive(
            &task,
            ".github/workflows/ci.yml",
            &["AWS_ACCESS_KEY_ID".to_string()],
            true,
        );
        assert_eq!(plan.branch, "pipesmith/task-abc");
        assert!(plan.title.contains("widgets"));
        assert!(plan.body.contains("AWS_ACCESS_KEY_ID"));
        assert!(plan.draft);
    }
}
