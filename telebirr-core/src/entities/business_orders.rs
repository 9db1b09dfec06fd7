//! The restaurant's own `orders` table, seen through the narrow slice the
//! payment core needs: read an order and set its payment-facing status.

use kanau::processor::Processor;
use rust_decimal::Decimal;

use crate::framework::{DatabaseProcessor, PgTransaction};

const BUSINESS_ORDER_COLUMNS: &str = "id::text AS id, status, total_amount";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct BusinessOrder {
    pub id: String,
    pub status: String,
    pub total_amount: Option<Decimal>,
}

/// Statuses the payment core writes onto a business order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderPaymentStatus {
    Paid,
    Cancelled,
    Refunded,
}

impl OrderPaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderPaymentStatus::Paid => "paid",
            OrderPaymentStatus::Cancelled => "cancelled",
            OrderPaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read a business order without locking it.
#[derive(Debug, Clone)]
pub struct GetBusinessOrder {
    pub id: String,
}

impl Processor<GetBusinessOrder> for DatabaseProcessor {
    type Output = Option<BusinessOrder>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetBusinessOrder")]
    async fn process(&self, query: GetBusinessOrder) -> Result<Option<BusinessOrder>, sqlx::Error> {
        let sql = format!("SELECT {BUSINESS_ORDER_COLUMNS} FROM orders WHERE id::text = $1");
        sqlx::query_as::<_, BusinessOrder>(&sql)
            .bind(query.id)
            .fetch_optional(&self.pool)
            .await
    }
}

impl BusinessOrder {
    /// Fetch and row-lock a business order.
    pub async fn lock_tx(tx: &mut PgTransaction, id: &str) -> Result<Option<BusinessOrder>, sqlx::Error> {
        let sql = format!("SELECT {BUSINESS_ORDER_COLUMNS} FROM orders WHERE id::text = $1 FOR UPDATE");
        sqlx::query_as::<_, BusinessOrder>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Returns the number of rows touched.
    pub async fn update_status_tx(
        tx: &mut PgTransaction,
        id: &str,
        status: OrderPaymentStatus,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id::text = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }
}
