//! Durable task store for Pipesmith.
//!
//! The [`TaskStore`] trait is the single shared mutable resource between
//! concurrent executor instances and the read-only query surface. All
//! mutation goes through atomic per-task operations: `append_step` inserts at
//! the task's current step count inside a transaction, so a retried append of
//! the same step is a no-op while a competing write of a different step is a
//! conflict. Status transitions are enforced here, not in callers; terminal
//! states have no exits.
//!
//! Two implementations: [`SqliteTaskStore`] (WAL-mode SQLite, refinery
//! migrations) and [`InMemoryTaskStore`] for tests and ephemeral runs.

mod error;
mod memory;
mod sqlite;

pub use error::{Result, StoreError};
pub use memory::InMemoryTaskStore;
pub use sqlite::SqliteTaskStore;

use std::sync::Arc;

use async_trait::async_trait;

use pipesmith_types::{StepRecord, Task, TaskError, TaskStatus};

/// Contract for durable task state.
///
/// Every write must be visible to a subsequent `get` from any caller:
/// external monitors poll task state concurrently with execution, so
/// implementations must not cache.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new pending task. Fails with [`StoreError::Conflict`] if the
    /// id already exists.
    async fn create(&self, task: &Task) -> Result<()>;

    /// Fetch a task with its full ordered step log.
    async fn get(&self, id: &str) -> Result<Task>;

    /// Recently updated tasks, most recent first.
    async fn list(&self, limit: usize) -> Result<Vec<Task>>;

    /// Append a step record at the task's current step count.
    ///
    /// Idempotent on retry: re-appending a record equal to the task's last
    /// recorded step succeeds without duplicating it. Appending to a task in
    /// a terminal state is a conflict.
    async fn append_step(&self, id: &str, record: StepRecord) -> Result<()>;

    /// Transition the task's status, refreshing `updated_at`.
    ///
    /// Valid transitions: pending → in_progress, in_progress → completed,
    /// in_progress → failed. Writing the current status again is a no-op
    /// refresh; anything else is a conflict.
    async fn set_status(&self, id: &str, status: TaskStatus, error: Option<TaskError>)
    -> Result<()>;
}

/// A store that can be shared across executor instances.
pub type SharedTaskStore = Arc<dyn TaskStore>;

/// Shared transition check used by both implementations.
pub(crate) fn check_transition(current: TaskStatus, next: TaskStatus) -> Result<()> {
    if current == next {
        return Ok(());
    }
    let allowed = matches!(
        (current, next),
        (TaskStatus::Pending, TaskStatus::InProgress)
            | (TaskStatus::InProgress, TaskStatus::Completed)
            | (TaskStatus::InProgress, TaskStatus::Failed)
    );
    if allowed {
        Ok(())
    } else {
        Err(StoreError::Conflict(format!(
            "invalid status transition {} -> {}",
            current.as_str(),
            next.as_str()
        )))
    }
}

/// True if `record` retries the append that produced `last`.
pub(crate) fn is_replayed_append(last: &StepRecord, record: &StepRecord) -> bool {
    last.step == record.step && last.outcome == record.outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_transition_happy_path() {
        assert!(check_transition(TaskStatus::Pending, TaskStatus::InProgress).is_ok());
        assert!(check_transition(TaskStatus::InProgress, TaskStatus::Completed).is_ok());
        assert!(check_transition(TaskStatus::InProgress, TaskStatus::Failed).is_ok());
    }

    #[test]
    fn test_check_transition_terminal_states_are_final() {
        assert!(check_transition(TaskStatus::Completed, TaskStatus::InProgress).is_err());
        assert!(check_transition(TaskStatus::Completed, TaskStatus::Failed).is_err());
        assert!(check_transition(TaskStatus::Failed, TaskStatus::Completed).is_err());
        assert!(check_transition(TaskStatus::Failed, TaskStatus::InProgress).is_err());
    }

    #[test]
    fn test_check_transition_no_skipping() {
        assert!(check_transition(TaskStatus::Pending, TaskStatus::Completed).is_err());
        assert!(check_transition(TaskStatus::Pending, TaskStatus::Failed).is_err());
    }

    #[test]
    fn test_same_status_is_noop() {
        assert!(check_transition(TaskStatus::InProgress, TaskStatus::InProgress).is_ok());
    }
}
