use axum::{Json, extract::Path, response::IntoResponse};
use telebirr_sdk::objects::admin::NotificationResponse;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::AdminApiError;

/// `GET /payments/{correlation_id}/notifications`: every authenticated
/// callback received for a payment, oldest first.
pub async fn list_notifications(
    state: axum::extract::State<AppState>,
    _auth: AdminAuth,
    Path(correlation_id): Path<String>,
) -> Result<impl IntoResponse, AdminApiError> {
    state
        .ledger
        .gateway_order(&correlation_id)
        .await?
        .ok_or(AdminApiError::NotFound)?;

    let notifications = state.ledger.notifications_for(&correlation_id).await?;
    let response: Vec<NotificationResponse> = notifications.into_iter().map(Into::into).collect();
    Ok(Json(response))
}
