//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use pipesmith_engine::WorkflowExecutor;
use pipesmith_store::SharedTaskStore;
use pipesmith_types::{Submission, Task};

/// State shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    store: SharedTaskStore,
    executor: Arc<WorkflowExecutor>,
    /// Cancellation tokens for in-flight executions, by task id.
    cancellations: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl AppState {
    pub fn new(store: SharedTaskStore, executor: Arc<WorkflowExecutor>) -> Self {
        Self {
            store,
            executor,
            cancellations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &SharedTaskStore {
        &self.store
    }

    pub fn executor(&self) -> &Arc<WorkflowExecutor> {
        &self.executor
    }

    /// Spawn a detached execution of a prepared task.
    ///
    /// The cancellation token stays registered until the run reaches a
    /// terminal state, so a cancel request can reach it at any point.
    pub fn spawn_execution(&self, task: Task, submission: Submission) {
        let token = CancellationToken::new();
        let task_id = task.id.clone();
        self.cancellations
            .lock()
            .insert(task_id.clone(), token.clone());

        let executor = self.executor.clone();
        let cancellations = self.cancellations.clone();
        tokio::spawn(async move {
            match executor.execute(task, &submission, token).await {
                Ok(task) => {
                    tracing::info!(
                        task_id = %task.id,
                        status = task.status.as_str(),
                        "Task execution finished"
                    );
                }
                Err(e) => {
                    tracing::error!(task_id = %task_id, error = %e, "Task execution aborted");
                }
            }
            cancellations.lock().remove(&task_id);
        });
    }

    /// Request cancellation of an in-flight task. Returns false when no
    /// execution is registered under the id.
    pub fn cancel(&self, task_id: &str) -> bool {
        match self.cancellations.lock().get(task_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of executions currently registered.
    pub fn in_flight(&self) -> usize {
        self.cancellations.lock().len()
    }
}
