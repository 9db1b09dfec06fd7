use axum::{Json, extract::Query, response::IntoResponse};
use telebirr_sdk::objects::admin::{ListRetryTasksQuery, RetryTaskResponse, clamp_pagination};

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::AdminApiError;

/// `GET /retry-tasks`: list retry tasks, newest first, optionally by status.
pub async fn list_retry_tasks(
    state: axum::extract::State<AppState>,
    _auth: AdminAuth,
    Query(query): Query<ListRetryTasksQuery>,
) -> Result<impl IntoResponse, AdminApiError> {
    let (limit, offset) = clamp_pagination(query.limit, query.offset);

    let tasks = state
        .retries
        .list(query.status.map(Into::into), limit, offset)
        .await?;

    let response: Vec<RetryTaskResponse> = tasks.into_iter().map(Into::into).collect();
    Ok(Json(response))
}
