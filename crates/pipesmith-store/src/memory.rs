//! In-memory task store for tests and ephemeral one-shot runs.

use std::collections::HashMap;

use parking_lot::RwLock;

use pipesmith_types::{StepRecord, Task, TaskError, TaskStatus, now};

use crate::error::{Result, StoreError};
use crate::{TaskStore, check_transition, is_replayed_append};

/// Map-backed [`TaskStore`] with the same invariant enforcement as the
/// SQLite implementation.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&task.id) {
            return Err(StoreError::Conflict(format!(
                "task already exists: {}",
                task.id
            )));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Task> {
        self.tasks
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self, limit: usize) -> Result<Vec<Task>> {
        let tasks = self.tasks.read();
        let mut all: Vec<Task> = tasks.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        all.truncate(limit);
        Ok(all)
    }

    async fn append_step(&self, id: &str, record: StepRecord) -> Result<()> {
        let mut tasks = self.tasks.write();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if task.status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "cannot append step to {} task {}",
                task.status.as_str(),
                id
            )));
        }

        if let Some(last) = task.steps.last()
            && is_replayed_append(last, &record)
        {
            return Ok(());
        }

        task.push_step(record);
        Ok(())
    }

    async fn set_status(
        &self,
        id: &str,
        status: TaskStatus,
        error: Option<TaskError>,
    ) -> Result<()> {
        let mut tasks = self.tasks.write();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        check_transition(task.status, status)?;
        task.status = status;
        if error.is_some() {
            task.error = error;
        }
        task.updated_at = now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesmith_types::{StepName, Subject};
    use serde_json::json;

    fn subject() -> Subject {
        Subject::parse("https://github.com/acme/widgets", "main").unwrap()
    }

    #[tokio::test]
    async fn test_same_semantics_as_sqlite() {
        let store = InMemoryTaskStore::new();
        store.create(&Task::new("task-1", subject())).await.unwrap();
        assert!(store.create(&Task::new("task-1", subject())).await.is_err());

        store
            .set_status("task-1", TaskStatus::InProgress, None)
            .await
            .unwrap();

        let record = StepRecord::success(StepName::Ingestion, json!({}));
        store.append_step("task-1", record.clone()).await.unwrap();
        store.append_step("task-1", record).await.unwrap();
        assert_eq!(store.get("task-1").await.unwrap().steps.len(), 1);

        store
            .set_status("task-1", TaskStatus::Completed, None)
            .await
            .unwrap();
        assert!(
            store
                .append_step("task-1", StepRecord::success(StepName::Design, json!({})))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_concurrent_tasks_do_not_interfere() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryTaskStore::new());
        for id in ["task-a", "task-b"] {
            store.create(&Task::new(id, subject())).await.unwrap();
            store
                .set_status(id, TaskStatus::InProgress, None)
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for id in ["task-a", "task-b"] {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for step in [StepName::Ingestion, StepName::Analysis, StepName::Design] {
                    store
                        .append_step(id, StepRecord::success(step, json!({})))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for id in ["task-a", "task-b"] {
            let task = store.get(id).await.unwrap();
            assert_eq!(
                task.step_names(),
                vec![StepName::Ingestion, StepName::Analysis, StepName::Design]
            );
        }
    }
}
