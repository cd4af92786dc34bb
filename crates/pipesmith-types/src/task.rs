//! Task lifecycle types.
//!
//! A [`Task`] is one end-to-end run of the fixed step sequence against a
//! single subject. Its ordered [`StepRecord`] log is append-only and mirrors
//! execution order exactly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{CapabilityRole, Subject, Timestamp, now};

// ─────────────────────────────────────────────────────────────────────────────
// Step names
// ─────────────────────────────────────────────────────────────────────────────

/// Names of steps in the fixed catalog.
///
/// `GenerationAttempt` carries the attempt index because each bounded
/// generation attempt is recorded as its own step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum StepName {
    Ingestion,
    Analysis,
    Design,
    SecurityReview,
    Generation,
    GenerationAttempt(u32),
    Validation,
    PrPreparation,
    Publish,
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepName::Ingestion => f.write_str("ingestion"),
            StepName::Analysis => f.write_str("analysis"),
            StepName::Design => f.write_str("design"),
            StepName::SecurityReview => f.write_str("security-review"),
            StepName::Generation => f.write_str("generation"),
            StepName::GenerationAttempt(n) => write!(f, "generation-attempt-{}", n),
            StepName::Validation => f.write_str("validation"),
            StepName::PrPreparation => f.write_str("pr-preparation"),
            StepName::Publish => f.write_str("publish"),
        }
    }
}

impl From<StepName> for String {
    fn from(name: StepName) -> Self {
        name.to_string()
    }
}

impl TryFrom<String> for StepName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::str::FromStr for StepName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingestion" => Ok(StepName::Ingestion),
            "analysis" => Ok(StepName::Analysis),
            "design" => Ok(StepName::Design),
            "security-review" => Ok(StepName::SecurityReview),
            "generation" => Ok(StepName::Generation),
            "validation" => Ok(StepName::Validation),
            "pr-preparation" => Ok(StepName::PrPreparation),
            "publish" => Ok(StepName::Publish),
            other => {
                if let Some(n) = other.strip_prefix("generation-attempt-") {
                    n.parse::<u32>()
                        .map(StepName::GenerationAttempt)
                        .map_err(|_| format!("unknown step name: {}", other))
                } else {
                    Err(format!("unknown step name: {}", other))
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Step records
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    Error,
}

/// One entry in a task's ordered step log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: StepName,
    pub outcome: StepOutcome,
    /// Step-specific payload consumed by later steps.
    pub payload: serde_json::Value,
    /// True if the remediation engine supplied missing side effects.
    #[serde(default)]
    pub remediated: bool,
}

impl StepRecord {
    /// A successful step record.
    pub fn success(step: StepName, payload: serde_json::Value) -> Self {
        Self {
            step,
            outcome: StepOutcome::Success,
            payload,
            remediated: false,
        }
    }

    /// A failed step record.
    pub fn error(step: StepName, payload: serde_json::Value) -> Self {
        Self {
            step,
            outcome: StepOutcome::Error,
            payload,
            remediated: false,
        }
    }

    /// Mark the record as remediated.
    pub fn with_remediated(mut self) -> Self {
        self.remediated = true;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Task
// ─────────────────────────────────────────────────────────────────────────────

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    /// True for states with no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

/// Broad classification of a terminal failure, so callers can distinguish
/// "upstream capability degraded" from "invalid input" from "required side
/// effect could not be completed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Capability,
    Store,
    Validation,
    Remediation,
    Cancelled,
    InvalidInput,
}

/// Structured error recorded on a failed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    /// Step at which the task failed.
    pub step: StepName,
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(step: StepName, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            step,
            kind,
            message: message.into(),
        }
    }
}

/// One end-to-end pipeline-generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub subject: Subject,
    pub status: TaskStatus,
    /// Ordered, append-only step log.
    #[serde(default)]
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    /// Create a new pending task.
    pub fn new(id: impl Into<String>, subject: Subject) -> Self {
        let ts = now();
        Self {
            id: id.into(),
            subject,
            status: TaskStatus::Pending,
            steps: Vec::new(),
            error: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Mark the task as running.
    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.updated_at = now();
    }

    /// Mark the task as completed.
    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
        self.updated_at = now();
    }

    /// Mark the task as failed with a structured error.
    pub fn fail(&mut self, error: TaskError) {
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        self.updated_at = now();
    }

    /// Append a step record.
    pub fn push_step(&mut self, record: StepRecord) {
        self.steps.push(record);
        self.updated_at = now();
    }

    /// Ordered step names, useful for asserting catalog order.
    pub fn step_names(&self) -> Vec<StepName> {
        self.steps.iter().map(|s| s.step).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Submission
// ─────────────────────────────────────────────────────────────────────────────

/// External task-submission input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// Caller-supplied id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub repo_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Concrete capability instance per role.
    pub capability_ids: HashMap<CapabilityRole, String>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Submission {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            task_id: None,
            repo_url: repo_url.into(),
            branch: default_branch(),
            capability_ids: HashMap::new(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_capability(mut self, role: CapabilityRole, id: impl Into<String>) -> Self {
        self.capability_ids.insert(role, id.into());
        self
    }

    /// Look up the capability instance fulfilling a role.
    pub fn capability(&self, role: CapabilityRole) -> Option<&str> {
        self.capability_ids.get(&role).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_name_round_trip() {
        for name in [
            StepName::Ingestion,
            StepName::Analysis,
            StepName::Design,
            StepName::SecurityReview,
            StepName::Generation,
            StepName::GenerationAttempt(1),
            StepName::GenerationAttempt(2),
            StepName::Validation,
            StepName::PrPreparation,
            StepName::Publish,
        ] {
            let s = name.to_string();
            let back: StepName = s.parse().unwrap();
            assert_eq!(back, name);
        }
    }

    #[test]
    fn test_step_name_serde_is_string() {
        let json = serde_json::to_string(&StepName::GenerationAttempt(2)).unwrap();
        assert_eq!(json, "\"generation-attempt-2\"");
        let back: StepName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StepName::GenerationAttempt(2));
    }

    #[test]
    fn test_step_name_rejects_unknown() {
        assert!("flurb".parse::<StepName>().is_err());
        assert!("generation-attempt-x".parse::<StepName>().is_err());
    }

    #[test]
    fn test_task_lifecycle() {
        let subject = Subject::parse("https://github.com/acme/widgets", "main").unwrap();
        let mut task = Task::new("task-1", subject);
        assert_eq!(task.status, TaskStatus::Pending);

        task.start();
        assert_eq!(task.status, TaskStatus::InProgress);

        task.push_step(StepRecord::success(
            StepName::Ingestion,
            serde_json::json!({"summary": "rust repo"}),
        ));
        assert_eq!(task.step_names(), vec![StepName::Ingestion]);

        task.complete();
        assert!(task.status.is_terminal());
        assert!(task.error.is_none());
    }

    #[test]
    fn test_task_fail_records_error() {
        let subject = Subject::parse("https://github.com/acme/widgets", "main").unwrap();
        let mut task = Task::new("task-1", subject);
        task.start();
        task.fail(TaskError::new(
            StepName::Publish,
            ErrorKind::Remediation,
            "half-remediated publish",
        ));
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_ref().unwrap().kind, ErrorKind::Remediation);
    }

    #[test]
    fn test_submission_capability_lookup() {
        let sub = Submission::new("https://github.com/acme/widgets")
            .with_capability(CapabilityRole::RepoScanner, "scanner-1");
        assert_eq!(sub.capability(CapabilityRole::RepoScanner), Some("scanner-1"));
        assert_eq!(sub.capability(CapabilityRole::PrManager), None);
        assert_eq!(sub.branch, "main");
    }
}
