//! Outbound order creation for both Telebirr flows.
//!
//! A gateway client builds the flow's envelope, signs it, makes exactly one
//! HTTP call and, on a success code, records a `pending` [`GatewayOrder`]
//! before returning. A rejected or failed call is never retried here:
//! repeating it could create a second order at the gateway.

pub mod b2b;
pub mod c2b;
pub mod token;
pub mod transport;

use async_trait::async_trait;
use rust_decimal::Decimal;
use telebirr_sdk::signing::SigningError;

use crate::entities::GatewayFlow;
use crate::entities::gateway_orders::GatewayOrder;
use crate::store::StoreError;
use transport::TransportError;

pub use b2b::B2bGateway;
pub use c2b::C2bGateway;
pub use token::{AccessToken, TokenCache};
pub use transport::{GatewayTransport, HttpTransport};

/// Largest body echoed back inside an error.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid payment request: {0}")]
    InvalidRequest(String),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("access token unavailable: {0}")]
    Token(String),
    #[error("gateway rejected the request: code={code}, message={message}")]
    Rejected { code: String, message: String },
    #[error("malformed gateway response: {0}")]
    MalformedResponse(String),
    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),
    #[error("request encoding failed: {0}")]
    Encoding(String),
    #[error("ledger write failed: {0}")]
    Store(#[from] StoreError),
}

/// A request to collect `amount` for business order `order_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrder {
    pub order_id: String,
    pub amount: Decimal,
    pub subject: String,
    pub body: String,
}

impl CreateOrder {
    fn validate(&self) -> Result<(), GatewayError> {
        if self.order_id.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("order_id is empty".into()));
        }
        if self.amount <= Decimal::ZERO {
            return Err(GatewayError::InvalidRequest(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if self.amount.round_dp(2) != self.amount {
            return Err(GatewayError::InvalidRequest(format!(
                "amount has more than two decimal places: {}",
                self.amount
            )));
        }
        if self.subject.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("subject is empty".into()));
        }
        Ok(())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn flow(&self) -> GatewayFlow;

    async fn create_order(&self, request: CreateOrder) -> Result<GatewayOrder, GatewayError>;
}

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
