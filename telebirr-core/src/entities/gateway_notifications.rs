//! Append-only log of authenticated gateway callbacks.
//!
//! Rows are inserted once and never updated. `processed` records whether the
//! receipt was reconciled in the same transaction that stored it; a receipt
//! whose reconciliation was handed to the retry queue is stored with
//! `processed = false` and linked from the retry task.

use kanau::processor::Processor;
use rust_decimal::Decimal;
use sqlx::types::Json;
use telebirr_sdk::objects::admin::NotificationResponse;
use telebirr_sdk::objects::callback::CallbackParams;
use time::{OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

use super::GatewayFlow;
use crate::framework::{DatabaseProcessor, PgTransaction};

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct GatewayNotification {
    pub id: Uuid,
    pub flow: GatewayFlow,
    pub correlation_id: String,
    pub trade_no: Option<String>,
    /// Status string exactly as delivered, unknown values included.
    pub trade_status: String,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub passback_params: Option<String>,
    pub gmt_payment: Option<PrimitiveDateTime>,
    pub signature: String,
    pub sign_type: Option<String>,
    pub payload: Json<CallbackParams>,
    pub processed: bool,
    pub received_at: OffsetDateTime,
}

impl From<GatewayNotification> for NotificationResponse {
    fn from(n: GatewayNotification) -> Self {
        NotificationResponse {
            id: n.id,
            flow: n.flow.into(),
            correlation_id: n.correlation_id,
            trade_no: n.trade_no,
            trade_status: n.trade_status,
            amount: n.amount,
            currency: n.currency,
            processed: n.processed,
            received_at: n.received_at.unix_timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationInsert {
    pub flow: GatewayFlow,
    pub correlation_id: String,
    pub trade_no: Option<String>,
    pub trade_status: String,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub passback_params: Option<String>,
    pub gmt_payment: Option<PrimitiveDateTime>,
    pub signature: String,
    pub sign_type: Option<String>,
    pub payload: CallbackParams,
    pub processed: bool,
}

impl NotificationInsert {
    /// Extract the stored columns from a verified callback.
    pub fn from_callback(
        flow: GatewayFlow,
        correlation_id: &str,
        params: &CallbackParams,
        processed: bool,
    ) -> Self {
        Self {
            flow,
            correlation_id: correlation_id.to_string(),
            trade_no: params.trade_no().map(str::to_string),
            trade_status: params.raw_trade_status().to_string(),
            amount: params.total_amount(),
            currency: params.currency().map(str::to_string),
            passback_params: params.passback_params().map(str::to_string),
            gmt_payment: params.gmt_payment(),
            signature: params.signature().unwrap_or_default().to_string(),
            sign_type: params.sign_type().map(str::to_string),
            payload: params.clone(),
            processed,
        }
    }
}

const NOTIFICATION_COLUMNS: &str = r#"
    id, flow, correlation_id, trade_no, trade_status, amount, currency,
    passback_params, gmt_payment, signature, sign_type, payload, processed, received_at
"#;

const INSERT_NOTIFICATION: &str = r#"
    INSERT INTO gateway_notifications
        (id, flow, correlation_id, trade_no, trade_status, amount, currency,
         passback_params, gmt_payment, signature, sign_type, payload, processed)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
"#;

fn bind_insert(
    id: Uuid,
    insert: NotificationInsert,
) -> sqlx::query::Query<'static, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(INSERT_NOTIFICATION)
        .bind(id)
        .bind(insert.flow)
        .bind(insert.correlation_id)
        .bind(insert.trade_no)
        .bind(insert.trade_status)
        .bind(insert.amount)
        .bind(insert.currency)
        .bind(insert.passback_params)
        .bind(insert.gmt_payment)
        .bind(insert.signature)
        .bind(insert.sign_type)
        .bind(Json(insert.payload))
        .bind(insert.processed)
}

#[derive(Debug, Clone)]
pub struct InsertNotification(pub NotificationInsert);

impl Processor<InsertNotification> for DatabaseProcessor {
    type Output = Uuid;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertNotification")]
    async fn process(&self, cmd: InsertNotification) -> Result<Uuid, sqlx::Error> {
        let id = Uuid::now_v7();
        bind_insert(id, cmd.0).execute(&self.pool).await?;
        Ok(id)
    }
}

#[derive(Debug, Clone)]
pub struct ListNotifications {
    pub correlation_id: String,
}

impl Processor<ListNotifications> for DatabaseProcessor {
    type Output = Vec<GatewayNotification>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListNotifications")]
    async fn process(&self, query: ListNotifications) -> Result<Vec<GatewayNotification>, sqlx::Error> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM gateway_notifications WHERE correlation_id = $1 ORDER BY received_at, id"
        );
        sqlx::query_as::<_, GatewayNotification>(&sql)
            .bind(query.correlation_id)
            .fetch_all(&self.pool)
            .await
    }
}

impl GatewayNotification {
    pub async fn insert_tx(tx: &mut PgTransaction, insert: NotificationInsert) -> Result<Uuid, sqlx::Error> {
        let id = Uuid::now_v7();
        bind_insert(id, insert).execute(&mut **tx).await?;
        Ok(id)
    }
}
