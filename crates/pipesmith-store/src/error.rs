//! Error types for the task store.

use thiserror::Error;

/// Result type alias using the store error type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for task store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No task with the given id.
    #[error("task not found: {0}")]
    NotFound(String),

    /// A write conflicted with the task's current state (lost update,
    /// or a transition out of a terminal status).
    #[error("conflicting write: {0}")]
    Conflict(String),

    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Underlying database error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(String),
}

impl StoreError {
    /// True if retrying the same write later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
