//! SQLite-backed task store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};

use pipesmith_types::{StepName, StepOutcome, StepRecord, Subject, Task, TaskError, TaskStatus};

use crate::error::{Result, StoreError};
use crate::{TaskStore, check_transition, is_replayed_append};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Thin repository over SQLite for task state.
///
/// Thread-safe via internal `Mutex<Connection>`; the per-task atomicity
/// guarantees come from running each write inside a transaction.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Open (or create) the database at `path` and run pending migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&mut self) -> Result<()> {
        let conn = self.conn.get_mut().unwrap();
        embedded::migrations::runner()
            .run(conn)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(())
    }

    /// Lock the connection for use. Panics if poisoned.
    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn load_task(tx: &Transaction<'_>, id: &str) -> Result<Task> {
        let mut task = tx
            .query_row(
                "SELECT id, repo_url, owner, repo, branch, status, error, created_at, updated_at
                 FROM tasks WHERE id = ?1",
                params![id],
                row_to_task,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut stmt = tx.prepare(
            "SELECT step, outcome, payload, remediated
             FROM task_steps WHERE task_id = ?1 ORDER BY seq",
        )?;
        let iter = stmt.query_map(params![id], row_to_step)?;
        for record in iter {
            task.steps.push(record?);
        }

        Ok(task)
    }

    fn current_status(tx: &Transaction<'_>, id: &str) -> Result<TaskStatus> {
        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM tasks WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let status = status.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        status
            .parse()
            .map_err(|e: String| StoreError::Database(conversion_err(0, e)))
    }
}

#[async_trait::async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create(&self, task: &Task) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM tasks WHERE id = ?1",
                params![task.id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::Conflict(format!(
                "task already exists: {}",
                task.id
            )));
        }

        let error_json = task
            .error
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        tx.execute(
            "INSERT INTO tasks (id, repo_url, owner, repo, branch, status, error, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                task.id,
                task.subject.repo_url,
                task.subject.owner,
                task.subject.repo,
                task.subject.branch,
                task.status.as_str(),
                error_json,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        tracing::debug!(task_id = %task.id, subject = %task.subject, "Task created");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Task> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        Self::load_task(&tx, id)
    }

    async fn list(&self, limit: usize) -> Result<Vec<Task>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let ids: Vec<String> = {
            let mut stmt =
                tx.prepare("SELECT id FROM tasks ORDER BY updated_at DESC LIMIT ?1")?;
            let iter = stmt.query_map(params![limit as i64], |row| row.get(0))?;
            iter.collect::<rusqlite::Result<_>>()?
        };

        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            tasks.push(Self::load_task(&tx, &id)?);
        }
        Ok(tasks)
    }

    async fn append_step(&self, id: &str, record: StepRecord) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let status = Self::current_status(&tx, id)?;
        if status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "cannot append step to {} task {}",
                status.as_str(),
                id
            )));
        }

        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM task_steps WHERE task_id = ?1",
            params![id],
            |row| row.get(0),
        )?;

        // A retried append lands on the step that was already written.
        if count > 0 {
            let last: StepRecord = tx.query_row(
                "SELECT step, outcome, payload, remediated
                 FROM task_steps WHERE task_id = ?1 AND seq = ?2",
                params![id, count - 1],
                row_to_step,
            )?;
            if is_replayed_append(&last, &record) {
                tracing::debug!(task_id = %id, step = %record.step, "Replayed step append, no-op");
                return Ok(());
            }
        }

        tx.execute(
            "INSERT INTO task_steps (task_id, seq, step, outcome, payload, remediated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                count,
                record.step.to_string(),
                outcome_str(record.outcome),
                serde_json::to_string(&record.payload)?,
                record.remediated as i32,
            ],
        )?;
        tx.execute(
            "UPDATE tasks SET updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        tx.commit()?;

        tracing::debug!(task_id = %id, step = %record.step, seq = count, "Step recorded");
        Ok(())
    }

    async fn set_status(
        &self,
        id: &str,
        status: TaskStatus,
        error: Option<TaskError>,
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let current = Self::current_status(&tx, id)?;
        check_transition(current, status)?;

        let error_json = error.as_ref().map(serde_json::to_string).transpose()?;
        tx.execute(
            "UPDATE tasks SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                status.as_str(),
                error_json,
                Utc::now().to_rfc3339(),
                id
            ],
        )?;
        tx.commit()?;

        tracing::debug!(task_id = %id, status = status.as_str(), "Status updated");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let status_str: String = row.get(5)?;
    let status = status_str
        .parse::<TaskStatus>()
        .map_err(|e| conversion_err(5, e))?;

    let error_json: Option<String> = row.get(6)?;
    let error = match error_json {
        Some(json) => Some(
            serde_json::from_str::<TaskError>(&json).map_err(|e| conversion_err(6, e))?,
        ),
        None => None,
    };

    Ok(Task {
        id: row.get(0)?,
        subject: Subject {
            repo_url: row.get(1)?,
            owner: row.get(2)?,
            repo: row.get(3)?,
            branch: row.get(4)?,
        },
        status,
        steps: Vec::new(),
        error,
        created_at: parse_dt(&row.get::<_, String>(7)?).map_err(|e| conversion_err(7, e))?,
        updated_at: parse_dt(&row.get::<_, String>(8)?).map_err(|e| conversion_err(8, e))?,
    })
}

fn row_to_step(row: &rusqlite::Row<'_>) -> rusqlite::Result<StepRecord> {
    let step_str: String = row.get(0)?;
    let step = step_str
        .parse::<StepName>()
        .map_err(|e| conversion_err(0, e))?;

    let outcome_str: String = row.get(1)?;
    let outcome = match outcome_str.as_str() {
        "success" => StepOutcome::Success,
        "error" => StepOutcome::Error,
        other => return Err(conversion_err(1, format!("unknown outcome: {}", other))),
    };

    let payload_json: String = row.get(2)?;
    let payload =
        serde_json::from_str(&payload_json).map_err(|e| conversion_err(2, e))?;

    Ok(StepRecord {
        step,
        outcome,
        payload,
        remediated: row.get::<_, i32>(3)? != 0,
    })
}

fn outcome_str(outcome: StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Success => "success",
        StepOutcome::Error => "error",
    }
}

fn parse_dt(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

fn conversion_err(idx: usize, err: impl ToString) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        err.to_string().into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesmith_types::{ErrorKind, StepName};
    use serde_json::json;

    fn subject() -> Subject {
        Subject::parse("https://github.com/acme/widgets", "main").unwrap()
    }

    fn store() -> SqliteTaskStore {
        SqliteTaskStore::open_in_memory().unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = store();
        let task = Task::new("task-1", subject());
        store.create(&task).await.unwrap();

        let loaded = store.get("task-1").await.unwrap();
        assert_eq!(loaded.id, "task-1");
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert_eq!(loaded.subject.full_name(), "acme/widgets");
        assert!(loaded.steps.is_empty());
    }

    #[tokio::test]
    async fn test_create_duplicate_is_conflict() {
        let store = store();
        let task = Task::new("task-1", subject());
        store.create(&task).await.unwrap();
        match store.create(&task).await {
            Err(StoreError::Conflict(_)) => {}
            other => panic!("expected Conflict, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = store();
        match store.get("nope").await {
            Err(StoreError::NotFound(id)) => assert_eq!(id, "nope"),
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = store();
        store.create(&Task::new("task-1", subject())).await.unwrap();
        store
            .set_status("task-1", TaskStatus::InProgress, None)
            .await
            .unwrap();

        store
            .append_step("task-1", StepRecord::success(StepName::Ingestion, json!({})))
            .await
            .unwrap();
        store
            .append_step("task-1", StepRecord::error(StepName::Analysis, json!({})))
            .await
            .unwrap();
        store
            .append_step("task-1", StepRecord::success(StepName::Design, json!({})))
            .await
            .unwrap();

        let task = store.get("task-1").await.unwrap();
        assert_eq!(
            task.step_names(),
            vec![StepName::Ingestion, StepName::Analysis, StepName::Design]
        );
    }

    #[tokio::test]
    async fn test_retried_append_is_idempotent() {
        let store = store();
        store.create(&Task::new("task-1", subject())).await.unwrap();
        store
            .set_status("task-1", TaskStatus::InProgress, None)
            .await
            .unwrap();

        let record = StepRecord::success(StepName::Ingestion, json!({"summary": "x"}));
        store.append_step("task-1", record.clone()).await.unwrap();
        // Simulated retry after a lost acknowledgement.
        store.append_step("task-1", record).await.unwrap();

        let task = store.get("task-1").await.unwrap();
        assert_eq!(task.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_append_to_terminal_task_is_conflict() {
        let store = store();
        store.create(&Task::new("task-1", subject())).await.unwrap();
        store
            .set_status("task-1", TaskStatus::InProgress, None)
            .await
            .unwrap();
        store
            .set_status("task-1", TaskStatus::Completed, None)
            .await
            .unwrap();

        let result = store
            .append_step("task-1", StepRecord::success(StepName::Ingestion, json!({})))
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_status_transitions_enforced() {
        let store = store();
        store.create(&Task::new("task-1", subject())).await.unwrap();

        // pending -> completed skips in_progress
        assert!(
            store
                .set_status("task-1", TaskStatus::Completed, None)
                .await
                .is_err()
        );

        store
            .set_status("task-1", TaskStatus::InProgress, None)
            .await
            .unwrap();
        store
            .set_status(
                "task-1",
                TaskStatus::Failed,
                Some(TaskError::new(
                    StepName::Publish,
                    ErrorKind::Capability,
                    "publish capability unavailable",
                )),
            )
            .await
            .unwrap();

        // no transitions out of failed
        assert!(
            store
                .set_status("task-1", TaskStatus::InProgress, None)
                .await
                .is_err()
        );

        let task = store.get("task-1").await.unwrap();
        assert_eq!(task.error.unwrap().kind, ErrorKind::Capability);
    }

    #[tokio::test]
    async fn test_list_orders_by_recency() {
        let store = store();
        for id in ["task-a", "task-b"] {
            store.create(&Task::new(id, subject())).await.unwrap();
        }
        store
            .set_status("task-a", TaskStatus::InProgress, None)
            .await
            .unwrap();

        let tasks = store.list(10).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "task-a");
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tasks.db");

        {
            let store = SqliteTaskStore::open(&path).unwrap();
            store.create(&Task::new("task-1", subject())).await.unwrap();
        }

        let store = SqliteTaskStore::open(&path).unwrap();
        let task = store.get("task-1").await.unwrap();
        assert_eq!(task.id, "task-1");
    }
}
