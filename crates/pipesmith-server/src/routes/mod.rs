//! Route handlers.

pub mod health;
pub mod tasks;

pub use health::{HealthResponse, health, health_routes};
pub use tasks::{
    ListTasksQuery, ListTasksResponse, SubmitResponse, TaskSummary, cancel_task_handler,
    get_task_handler, list_tasks_handler, submit_task_handler,
};
