//! HTTP API for Pipesmith.
//!
//! The network surface over the workflow engine: submit a task, query its
//! status and ordered step log, list recent tasks, request cancellation.
//! Writes are never exposed beyond submission and cancellation; external
//! monitors get read-only access.

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ErrorResponse, Result, ServerError};
pub use routes::{HealthResponse, ListTasksResponse, SubmitResponse, TaskSummary};
pub use state::AppState;

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The Pipesmith HTTP server.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            .merge(routes::health_routes())
            .nest("/api/v1", self.api_routes())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// API routes (v1).
    fn api_routes(&self) -> Router<AppState> {
        use axum::routing::{get, post};

        Router::new()
            .route(
                "/tasks",
                post(routes::submit_task_handler).get(routes::list_tasks_handler),
            )
            .route("/tasks/{id}", get(routes::get_task_handler))
            .route("/tasks/{id}/cancel", post(routes::cancel_task_handler))
    }

    /// Bind and serve until the process is stopped.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let router = self.router();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("failed to bind {}: {}", addr, e)))?;

        info!(%addr, "Pipesmith server listening");
        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::Internal(format!("server error: {}", e)))?;
        Ok(())
    }
}
