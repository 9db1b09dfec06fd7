//! Admin API request and response types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::GatewayFlow;

/// Retry task status for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryTaskStatus {
    Pending,
    Completed,
    DeadLetter,
}

impl std::fmt::Display for RetryTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryTaskStatus::Pending => write!(f, "pending"),
            RetryTaskStatus::Completed => write!(f, "completed"),
            RetryTaskStatus::DeadLetter => write!(f, "dead_letter"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryTaskResponse {
    pub id: Uuid,
    pub flow: GatewayFlow,
    pub correlation_id: String,
    pub notification_id: Option<Uuid>,
    pub attempt_count: i32,
    pub status: RetryTaskStatus,
    pub next_attempt_at: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One recorded callback receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub flow: GatewayFlow,
    pub correlation_id: String,
    pub trade_no: Option<String>,
    pub trade_status: String,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub processed: bool,
    pub received_at: i64,
}

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 200;
const MAX_OFFSET: i64 = 100_000;

#[derive(Debug, Clone, Deserialize)]
pub struct ListRetryTasksQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub status: Option<RetryTaskStatus>,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

/// Clamp limit and offset to safe maximums.
pub fn clamp_pagination(limit: i64, offset: i64) -> (i64, i64) {
    (limit.clamp(1, MAX_LIMIT), offset.clamp(0, MAX_OFFSET))
}
