//! The gateway order ledger: one row per payment attempt at Telebirr.

use kanau::processor::Processor;
use rust_decimal::Decimal;
use telebirr_sdk::objects::PaymentStatus as SdkPaymentStatus;
use telebirr_sdk::objects::service::PaymentResponse;
use time::OffsetDateTime;
use uuid::Uuid;

use super::GatewayFlow;
use crate::framework::{DatabaseProcessor, PgTransaction};

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct GatewayOrder {
    pub id: Uuid,
    pub flow: GatewayFlow,
    /// Business order this payment belongs to.
    pub order_id: String,
    /// `prepay_id` for B2B, `out_trade_no` for C2B. Never changes once written.
    pub correlation_id: String,
    pub merchant_order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub subject: String,
    pub body: String,
    pub status: GatewayOrderStatus,
    pub checkout_url: String,
    /// Telebirr's own transaction number, once known.
    pub trade_no: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Gateway order status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `telebirr_sdk::objects::PaymentStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "gateway_order_status")]
pub enum GatewayOrderStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl GatewayOrderStatus {
    /// Whether `self -> next` is an allowed state change.
    ///
    /// `pending` settles once into `completed` or `failed`; only a completed
    /// payment can be refunded. Staying in the same state is not a transition.
    pub fn can_transition_to(self, next: GatewayOrderStatus) -> bool {
        use GatewayOrderStatus::*;
        matches!(
            (self, next),
            (Pending, Completed) | (Pending, Failed) | (Completed, Refunded)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GatewayOrderStatus::Pending => "pending",
            GatewayOrderStatus::Completed => "completed",
            GatewayOrderStatus::Failed => "failed",
            GatewayOrderStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for GatewayOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<GatewayOrderStatus> for SdkPaymentStatus {
    fn from(value: GatewayOrderStatus) -> Self {
        match value {
            GatewayOrderStatus::Pending => SdkPaymentStatus::Pending,
            GatewayOrderStatus::Completed => SdkPaymentStatus::Completed,
            GatewayOrderStatus::Failed => SdkPaymentStatus::Failed,
            GatewayOrderStatus::Refunded => SdkPaymentStatus::Refunded,
        }
    }
}

impl From<GatewayOrder> for PaymentResponse {
    fn from(order: GatewayOrder) -> Self {
        PaymentResponse {
            id: order.id,
            flow: order.flow.into(),
            order_id: order.order_id,
            correlation_id: order.correlation_id,
            merchant_order_id: order.merchant_order_id,
            amount: order.amount,
            currency: order.currency,
            subject: order.subject,
            status: order.status.into(),
            checkout_url: order.checkout_url,
            trade_no: order.trade_no,
            created_at: order.created_at.unix_timestamp(),
            updated_at: order.updated_at.unix_timestamp(),
        }
    }
}

/// A freshly created order, always written as `pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrderInsert {
    pub flow: GatewayFlow,
    pub order_id: String,
    pub correlation_id: String,
    pub merchant_order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub subject: String,
    pub body: String,
    pub checkout_url: String,
    pub trade_no: Option<String>,
}

const GATEWAY_ORDER_COLUMNS: &str = r#"
    id, flow, order_id, correlation_id, merchant_order_id, amount, currency,
    subject, body, status, checkout_url, trade_no, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct InsertGatewayOrder(pub GatewayOrderInsert);

impl Processor<InsertGatewayOrder> for DatabaseProcessor {
    type Output = GatewayOrder;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertGatewayOrder")]
    async fn process(&self, cmd: InsertGatewayOrder) -> Result<GatewayOrder, sqlx::Error> {
        let insert = cmd.0;
        let sql = format!(
            r#"
            INSERT INTO gateway_orders
                (id, flow, order_id, correlation_id, merchant_order_id, amount, currency,
                 subject, body, status, checkout_url, trade_no)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10, $11)
            RETURNING {GATEWAY_ORDER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, GatewayOrder>(&sql)
            .bind(Uuid::now_v7())
            .bind(insert.flow)
            .bind(insert.order_id)
            .bind(insert.correlation_id)
            .bind(insert.merchant_order_id)
            .bind(insert.amount)
            .bind(insert.currency)
            .bind(insert.subject)
            .bind(insert.body)
            .bind(insert.checkout_url)
            .bind(insert.trade_no)
            .fetch_one(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct GetGatewayOrderByCorrelation {
    pub correlation_id: String,
}

impl Processor<GetGatewayOrderByCorrelation> for DatabaseProcessor {
    type Output = Option<GatewayOrder>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetGatewayOrderByCorrelation")]
    async fn process(
        &self,
        query: GetGatewayOrderByCorrelation,
    ) -> Result<Option<GatewayOrder>, sqlx::Error> {
        let sql = format!(
            "SELECT {GATEWAY_ORDER_COLUMNS} FROM gateway_orders WHERE correlation_id = $1"
        );
        sqlx::query_as::<_, GatewayOrder>(&sql)
            .bind(query.correlation_id)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct ListGatewayOrdersForOrder {
    pub order_id: String,
}

impl Processor<ListGatewayOrdersForOrder> for DatabaseProcessor {
    type Output = Vec<GatewayOrder>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListGatewayOrdersForOrder")]
    async fn process(&self, query: ListGatewayOrdersForOrder) -> Result<Vec<GatewayOrder>, sqlx::Error> {
        let sql = format!(
            "SELECT {GATEWAY_ORDER_COLUMNS} FROM gateway_orders WHERE order_id = $1 ORDER BY created_at, id"
        );
        sqlx::query_as::<_, GatewayOrder>(&sql)
            .bind(query.order_id)
            .fetch_all(&self.pool)
            .await
    }
}

impl GatewayOrder {
    /// Fetch and row-lock an order for the rest of the transaction.
    pub async fn lock_by_correlation_tx(
        tx: &mut PgTransaction,
        correlation_id: &str,
    ) -> Result<Option<GatewayOrder>, sqlx::Error> {
        let sql = format!(
            "SELECT {GATEWAY_ORDER_COLUMNS} FROM gateway_orders WHERE correlation_id = $1 FOR UPDATE"
        );
        sqlx::query_as::<_, GatewayOrder>(&sql)
            .bind(correlation_id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Set the status and, when given, the gateway transaction number.
    pub async fn set_status_tx(
        tx: &mut PgTransaction,
        id: Uuid,
        status: GatewayOrderStatus,
        trade_no: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE gateway_orders
            SET status = $2,
                trade_no = COALESCE($3, trade_no),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(trade_no)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
