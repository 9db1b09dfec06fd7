//! Inbound Telebirr payment notifications.
//!
//! # Endpoints
//!
//! - `POST /telebirr/b2b/notify` – B2B callback, correlated by `prepay_id`
//! - `POST /telebirr/c2b/notify` – C2B callback, correlated by `out_trade_no`
//!
//! Both take form-encoded parameters and answer the plain body `success` once
//! the callback is authenticated and belongs to a known order, even when its
//! reconciliation was deferred to the retry queue.

use axum::{
    Form, Json, Router,
    extract::{State, rejection::FormRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;
use telebirr_core::entities::GatewayFlow;
use telebirr_core::processors::{CallbackError, CallbackOutcome};
use telebirr_sdk::objects::callback::CallbackParams;

use crate::state::AppState;

/// Body the gateway expects on acceptance.
const ACK_BODY: &str = "success";

/// Build the webhook router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/telebirr/b2b/notify", post(b2b_notify))
        .route("/telebirr/c2b/notify", post(c2b_notify))
}

async fn b2b_notify(
    state: State<AppState>,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Result<impl IntoResponse, WebhookError> {
    handle(&state, GatewayFlow::B2b, form).await
}

async fn c2b_notify(
    state: State<AppState>,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Result<impl IntoResponse, WebhookError> {
    handle(&state, GatewayFlow::C2b, form).await
}

async fn handle(
    state: &AppState,
    flow: GatewayFlow,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Result<&'static str, WebhookError> {
    let Form(pairs) = form.map_err(|e| {
        tracing::warn!(flow = %flow, error = %e, "Unparsable callback body");
        WebhookError::InvalidForm
    })?;
    let params = CallbackParams::from_pairs(pairs);

    match state.callbacks.handle(flow, params).await? {
        CallbackOutcome::Reconciled(outcome) => {
            tracing::debug!(flow = %flow, outcome = ?outcome, "Callback acknowledged");
        }
        CallbackOutcome::Deferred { retry_task_id } => {
            tracing::info!(flow = %flow, retry_task_id = %retry_task_id, "Callback acknowledged, reconciliation deferred");
        }
    }
    Ok(ACK_BODY)
}

/// Errors that can occur in webhook handlers.
#[derive(Debug)]
enum WebhookError {
    InvalidForm,
    Callback(CallbackError),
}

impl From<CallbackError> for WebhookError {
    fn from(e: CallbackError) -> Self {
        WebhookError::Callback(e)
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            WebhookError::InvalidForm => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_form_data" })),
            )
                .into_response(),
            WebhookError::Callback(CallbackError::Authentication) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "authentication_error" })),
            )
                .into_response(),
            WebhookError::Callback(CallbackError::NotFound(_)) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "not_found" })),
            )
                .into_response(),
            WebhookError::Callback(CallbackError::Storage(e)) => {
                tracing::error!(error = %e, "Callback could not be stored");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal_error" })),
                )
                    .into_response()
            }
        }
    }
}
