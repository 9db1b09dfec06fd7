//! Admin API handlers.
//!
//! These endpoints are used by operators and require the
//! `Telebirr-Admin-Authorization` header with the plaintext admin secret.
//!
//! # Endpoints
//!
//! - `GET  /retry-tasks`                                  – list retry tasks (paginated, filterable)
//! - `POST /retry-tasks/{task_id}/requeue`                – move a dead letter back to the queue
//! - `GET  /payments/{correlation_id}/notifications`      – callback log of one payment

use axum::{
    Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use telebirr_core::store::StoreError;

use crate::state::AppState;

mod list_notifications;
mod list_retry_tasks;
mod requeue_retry_task;

/// Build the Admin API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/retry-tasks", get(list_retry_tasks::list_retry_tasks))
        .route(
            "/retry-tasks/{task_id}/requeue",
            post(requeue_retry_task::requeue_retry_task),
        )
        .route(
            "/payments/{correlation_id}/notifications",
            get(list_notifications::list_notifications),
        )
}

/// Errors that can occur in Admin API handlers.
#[derive(Debug)]
pub(crate) enum AdminApiError {
    Store(StoreError),
    NotFound,
}

impl From<StoreError> for AdminApiError {
    fn from(e: StoreError) -> Self {
        AdminApiError::Store(e)
    }
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AdminApiError::Store(e) => {
                tracing::error!(error = %e, "Admin API storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal_error" })),
                )
                    .into_response()
            }
            AdminApiError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "not_found" })),
            )
                .into_response(),
        }
    }
}
