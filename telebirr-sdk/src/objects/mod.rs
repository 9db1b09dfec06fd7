//! Wire objects: gateway envelopes, callback parameters and API bodies.

pub mod admin;
pub mod b2b;
pub mod c2b;
pub mod callback;
pub mod service;

use serde::{Deserialize, Serialize};

/// The two Telebirr integration flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayFlow {
    /// Token based; correlated by `prepay_id`.
    B2b,
    /// Direct-sign H5; correlated by `out_trade_no`.
    C2b,
}

impl GatewayFlow {
    /// Callback parameter carrying the correlation id.
    pub fn correlation_field(self) -> &'static str {
        match self {
            GatewayFlow::B2b => "prepay_id",
            GatewayFlow::C2b => "out_trade_no",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GatewayFlow::B2b => "b2b",
            GatewayFlow::C2b => "c2b",
        }
    }
}

impl std::fmt::Display for GatewayFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway order status for API responses.
///
/// The database version lives in `telebirr-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Completed => write!(f, "completed"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

/// Render an amount the way the gateway expects it: two decimal places.
pub fn format_amount(amount: rust_decimal::Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}
