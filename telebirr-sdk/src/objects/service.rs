//! Service API bodies, exchanged with the restaurant backend.
//!
//! Every request body implements [`Signature`] and travels HMAC-signed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{GatewayFlow, PaymentStatus};
use crate::signing::service::Signature;

/// Start a payment for a business order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    /// Internal business order id.
    pub order_id: String,
    pub amount: Decimal,
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

impl Signature for CreatePaymentRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusRequest {
    pub correlation_id: String,
}

impl Signature for PaymentStatusRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPaymentsRequest {
    pub order_id: String,
}

impl Signature for ListPaymentsRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub correlation_id: String,
    pub refund_amount: Decimal,
    #[serde(default)]
    pub refund_reason: String,
}

impl Signature for RefundRequest {}

/// One gateway order as seen by the service API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub flow: GatewayFlow,
    pub order_id: String,
    pub correlation_id: String,
    pub merchant_order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub subject: String,
    pub status: PaymentStatus,
    pub checkout_url: String,
    pub trade_no: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPaymentsResponse {
    pub order_id: String,
    pub payments: Vec<PaymentResponse>,
}
