//! Error types for the workflow engine.

use thiserror::Error;

use pipesmith_capability::CapabilityError;
use pipesmith_publish::PublishError;
use pipesmith_store::StoreError;
use pipesmith_types::{CapabilityRole, ErrorKind, StepName, SubjectError};

/// Result type alias using the engine error type.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Validation failures around the generated artifact and step postconditions.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The generated workflow document failed structural validation.
    #[error("workflow document invalid: {}", errors.join("; "))]
    SchemaInvalid { errors: Vec<String> },

    /// A step's required side effects were not observed.
    #[error("postconditions unmet for step '{step}': missing {}", missing.join(", "))]
    PostconditionUnmet {
        step: StepName,
        missing: Vec<String>,
    },
}

/// Remediation failures.
#[derive(Debug, Error)]
pub enum RemediationError {
    /// Some but not all missing operations could be remediated. For a
    /// mandatory step this is terminal: a half-remediated publish must never
    /// be treated as success.
    #[error(
        "partial remediation: completed [{}], failed at '{failed}': {source}",
        completed.join(", ")
    )]
    PartialFailure {
        completed: Vec<String>,
        failed: String,
        source: PublishError,
    },
}

/// Error type for the workflow engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Remediation(#[from] RemediationError),

    #[error(transparent)]
    Subject(#[from] SubjectError),

    /// The submission named no capability instance for a mandatory role.
    #[error("no capability bound for mandatory role '{role}'")]
    MissingCapability { role: CapabilityRole },

    /// Caller-requested cancellation of an in-flight task.
    #[error("task cancelled")]
    Cancelled,

    /// A step contract was violated internally (missing upstream payload).
    #[error("internal step error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Classify this error for the task record.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            EngineError::Capability(CapabilityError::Cancelled { .. }) | EngineError::Cancelled => {
                ErrorKind::Cancelled
            }
            EngineError::Capability(_) => ErrorKind::Capability,
            EngineError::Store(_) => ErrorKind::Store,
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Remediation(_) => ErrorKind::Remediation,
            EngineError::Subject(_) | EngineError::MissingCapability { .. } => {
                ErrorKind::InvalidInput
            }
            EngineError::Internal(_) => ErrorKind::Validation,
        }
    }
}
