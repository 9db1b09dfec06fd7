use axum::{Json, extract::Path, response::IntoResponse};
use telebirr_sdk::objects::admin::RetryTaskResponse;
use uuid::Uuid;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::AdminApiError;

/// `POST /retry-tasks/{task_id}/requeue`: give a dead-lettered task a fresh
/// set of attempts, due immediately.
pub async fn requeue_retry_task(
    state: axum::extract::State<AppState>,
    _auth: AdminAuth,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, AdminApiError> {
    let task = state
        .retries
        .requeue(task_id, state.clock.now())
        .await?
        .ok_or(AdminApiError::NotFound)?;

    tracing::info!(task_id = %task_id, correlation_id = %task.correlation_id, "Dead-lettered retry task requeued");
    Ok(Json(RetryTaskResponse::from(task)))
}
