//! Shared types for the Pipesmith pipeline-generation system.

pub mod role;
pub mod subject;
pub mod task;

pub use role::CapabilityRole;
pub use subject::{Subject, SubjectError};
pub use task::{
    ErrorKind, StepName, StepOutcome, StepRecord, Submission, Task, TaskError, TaskStatus,
};

/// Opaque identifier type.
pub type Id = String;

/// UTC timestamp type used across the system.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a new task identifier.
pub fn new_task_id() -> Id {
    format!("task-{}", uuid::Uuid::new_v4())
}

/// Current UTC time.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}
