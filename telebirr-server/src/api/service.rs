//! Service API handlers.
//!
//! These endpoints are called by the restaurant backend and require
//! a signed body verified via the `Telebirr-Service-Signature` header.
//!
//! # Endpoints
//!
//! - `POST /payments/b2b`       – start a B2B (web checkout) payment
//! - `POST /payments/c2b`       – start a C2B (H5) payment
//! - `POST /payments/status`    – status of one payment by correlation id
//! - `POST /payments/by-order`  – all payments for a business order
//! - `POST /payments/refund`    – mark a completed payment refunded

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use serde_json::json;
use telebirr_core::gateway::{CreateOrder, GatewayError, PaymentGateway};
use telebirr_core::processors::{RefundError, RefundOutcome};
use telebirr_core::store::StoreError;
use telebirr_sdk::objects::service::{
    CreatePaymentRequest, ListPaymentsRequest, ListPaymentsResponse, PaymentResponse,
    PaymentStatusRequest, RefundRequest,
};

use crate::api::extractors::SignedBody;
use crate::state::AppState;

/// Build the Service API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments/b2b", post(create_b2b_payment))
        .route("/payments/c2b", post(create_c2b_payment))
        .route("/payments/status", post(get_payment_status))
        .route("/payments/by-order", post(list_payments_for_order))
        .route("/payments/refund", post(refund_payment))
}

/// `POST /payments/b2b`: create a B2B pre-order and return the checkout URL.
async fn create_b2b_payment(
    state: State<AppState>,
    SignedBody(payload): SignedBody<CreatePaymentRequest>,
) -> Result<impl IntoResponse, ServiceApiError> {
    let gateway = state.b2b.clone().ok_or(ServiceApiError::FlowDisabled("b2b"))?;
    create_payment(&state, gateway, payload).await
}

/// `POST /payments/c2b`: create an H5 order and return the `h5_pay_url`.
async fn create_c2b_payment(
    state: State<AppState>,
    SignedBody(payload): SignedBody<CreatePaymentRequest>,
) -> Result<impl IntoResponse, ServiceApiError> {
    let gateway = state.c2b.clone().ok_or(ServiceApiError::FlowDisabled("c2b"))?;
    create_payment(&state, gateway, payload).await
}

async fn create_payment(
    state: &AppState,
    gateway: Arc<dyn PaymentGateway>,
    payload: CreatePaymentRequest,
) -> Result<(StatusCode, Json<PaymentResponse>), ServiceApiError> {
    state
        .ledger
        .find_business_order(&payload.order_id)
        .await?
        .ok_or(ServiceApiError::OrderNotFound)?;

    let order = gateway
        .create_order(CreateOrder {
            order_id: payload.order_id,
            amount: payload.amount,
            subject: payload.subject,
            body: payload.body,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// `POST /payments/status`: current state of one payment.
async fn get_payment_status(
    state: State<AppState>,
    SignedBody(payload): SignedBody<PaymentStatusRequest>,
) -> Result<impl IntoResponse, ServiceApiError> {
    let order = state
        .ledger
        .gateway_order(&payload.correlation_id)
        .await?
        .ok_or(ServiceApiError::PaymentNotFound)?;
    Ok(Json(PaymentResponse::from(order)))
}

/// `POST /payments/by-order`: every payment attempt for a business order.
async fn list_payments_for_order(
    state: State<AppState>,
    SignedBody(payload): SignedBody<ListPaymentsRequest>,
) -> Result<impl IntoResponse, ServiceApiError> {
    let orders = state.ledger.gateway_orders_for(&payload.order_id).await?;
    Ok(Json(ListPaymentsResponse {
        order_id: payload.order_id,
        payments: orders.into_iter().map(Into::into).collect(),
    }))
}

/// `POST /payments/refund`: refund a completed payment.
async fn refund_payment(
    state: State<AppState>,
    SignedBody(payload): SignedBody<RefundRequest>,
) -> Result<impl IntoResponse, ServiceApiError> {
    let outcome = state
        .reconciler
        .refund(
            &payload.correlation_id,
            payload.refund_amount,
            &payload.refund_reason,
        )
        .await?;
    let order = match outcome {
        RefundOutcome::Refunded(order) | RefundOutcome::AlreadyRefunded(order) => order,
    };
    Ok(Json(PaymentResponse::from(order)))
}

/// Errors that can occur in Service API handlers.
#[derive(Debug)]
enum ServiceApiError {
    Store(StoreError),
    Gateway(GatewayError),
    FlowDisabled(&'static str),
    OrderNotFound,
    PaymentNotFound,
    Refund(RefundError),
}

impl From<StoreError> for ServiceApiError {
    fn from(e: StoreError) -> Self {
        ServiceApiError::Store(e)
    }
}

impl From<GatewayError> for ServiceApiError {
    fn from(e: GatewayError) -> Self {
        ServiceApiError::Gateway(e)
    }
}

impl From<RefundError> for ServiceApiError {
    fn from(e: RefundError) -> Self {
        match e {
            RefundError::NotFound(_) => ServiceApiError::PaymentNotFound,
            RefundError::Store(e) => ServiceApiError::Store(e),
            other => ServiceApiError::Refund(other),
        }
    }
}

fn error_body(status: StatusCode, error: &str, details: Option<String>) -> axum::response::Response {
    let body = match details {
        Some(details) => json!({ "error": error, "details": details }),
        None => json!({ "error": error }),
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for ServiceApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ServiceApiError::Store(e) => {
                tracing::error!(error = %e, "Service API storage error");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            ServiceApiError::Gateway(GatewayError::InvalidRequest(details)) => {
                error_body(StatusCode::BAD_REQUEST, "invalid_request", Some(details))
            }
            ServiceApiError::Gateway(e) => {
                tracing::error!(error = %e, "Payment creation failed");
                error_body(
                    StatusCode::BAD_GATEWAY,
                    "payment_creation_failed",
                    Some(e.to_string()),
                )
            }
            ServiceApiError::FlowDisabled(flow) => error_body(
                StatusCode::NOT_FOUND,
                "flow_not_configured",
                Some(flow.to_string()),
            ),
            ServiceApiError::OrderNotFound => {
                error_body(StatusCode::NOT_FOUND, "order_not_found", None)
            }
            ServiceApiError::PaymentNotFound => {
                error_body(StatusCode::NOT_FOUND, "payment_not_found", None)
            }
            ServiceApiError::Refund(e) => {
                error_body(StatusCode::BAD_REQUEST, "refund_rejected", Some(e.to_string()))
            }
        }
    }
}
