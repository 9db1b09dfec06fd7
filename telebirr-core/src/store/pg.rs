use async_trait::async_trait;
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{LedgerStore, LedgerTx, OrderService, RetryStore, StoreError};
use crate::entities::business_orders::{BusinessOrder, GetBusinessOrder, OrderPaymentStatus};
use crate::entities::gateway_notifications::{
    GatewayNotification, InsertNotification, ListNotifications, NotificationInsert,
};
use crate::entities::gateway_orders::{
    GatewayOrder, GatewayOrderInsert, GatewayOrderStatus, GetGatewayOrderByCorrelation,
    InsertGatewayOrder, ListGatewayOrdersForOrder,
};
use crate::entities::retry_tasks::{
    ClaimDueRetryTasks, CompleteRetryTask, DeadLetterRetryTask, EnqueueRetryTask, ListRetryTasks,
    RequeueRetryTask, RescheduleRetryTask, RetryTask, RetryTaskInsert, RetryTaskStatus,
};
use crate::framework::{DatabaseProcessor, PgTransaction};

/// Postgres-backed ledger and retry queue.
#[derive(Debug, Clone)]
pub struct PgStore {
    db: DatabaseProcessor,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            db: DatabaseProcessor::new(pool),
        }
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn insert_gateway_order(&self, insert: GatewayOrderInsert) -> Result<GatewayOrder, StoreError> {
        let correlation_id = insert.correlation_id.clone();
        self.db
            .process(InsertGatewayOrder(insert))
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StoreError::DuplicateCorrelation(correlation_id)
                }
                other => StoreError::Database(other),
            })
    }

    async fn gateway_order(&self, correlation_id: &str) -> Result<Option<GatewayOrder>, StoreError> {
        Ok(self
            .db
            .process(GetGatewayOrderByCorrelation {
                correlation_id: correlation_id.to_string(),
            })
            .await?)
    }

    async fn gateway_orders_for(&self, order_id: &str) -> Result<Vec<GatewayOrder>, StoreError> {
        Ok(self
            .db
            .process(ListGatewayOrdersForOrder {
                order_id: order_id.to_string(),
            })
            .await?)
    }

    async fn record_notification(&self, insert: NotificationInsert) -> Result<Uuid, StoreError> {
        Ok(self.db.process(InsertNotification(insert)).await?)
    }

    async fn notifications_for(&self, correlation_id: &str) -> Result<Vec<GatewayNotification>, StoreError> {
        Ok(self
            .db
            .process(ListNotifications {
                correlation_id: correlation_id.to_string(),
            })
            .await?)
    }

    async fn find_business_order(&self, id: &str) -> Result<Option<BusinessOrder>, StoreError> {
        Ok(self.db.process(GetBusinessOrder { id: id.to_string() }).await?)
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let tx = self.db.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }
}

pub struct PgLedgerTx {
    tx: PgTransaction,
}

#[async_trait]
impl OrderService for PgLedgerTx {
    async fn get_order(&mut self, id: &str) -> Result<Option<BusinessOrder>, StoreError> {
        Ok(BusinessOrder::lock_tx(&mut self.tx, id).await?)
    }

    async fn update_order_status(&mut self, id: &str, status: OrderPaymentStatus) -> Result<(), StoreError> {
        let touched = BusinessOrder::update_status_tx(&mut self.tx, id, status).await?;
        if touched == 0 {
            return Err(StoreError::BusinessOrderNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_gateway_order(&mut self, correlation_id: &str) -> Result<Option<GatewayOrder>, StoreError> {
        Ok(GatewayOrder::lock_by_correlation_tx(&mut self.tx, correlation_id).await?)
    }

    async fn set_gateway_status(
        &mut self,
        id: Uuid,
        status: GatewayOrderStatus,
        trade_no: Option<&str>,
    ) -> Result<(), StoreError> {
        Ok(GatewayOrder::set_status_tx(&mut self.tx, id, status, trade_no).await?)
    }

    async fn record_notification(&mut self, insert: NotificationInsert) -> Result<Uuid, StoreError> {
        Ok(GatewayNotification::insert_tx(&mut self.tx, insert).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        Ok(self.tx.commit().await?)
    }
}

#[async_trait]
impl RetryStore for PgStore {
    async fn enqueue(&self, insert: RetryTaskInsert) -> Result<RetryTask, StoreError> {
        Ok(self.db.process(EnqueueRetryTask(insert)).await?)
    }

    async fn claim_due(
        &self,
        now: OffsetDateTime,
        limit: i64,
        lease_until: OffsetDateTime,
    ) -> Result<Vec<RetryTask>, StoreError> {
        Ok(self
            .db
            .process(ClaimDueRetryTasks {
                now,
                limit,
                lease_until,
            })
            .await?)
    }

    async fn reschedule(
        &self,
        id: Uuid,
        attempt_count: i32,
        next_attempt_at: OffsetDateTime,
        last_error: &str,
    ) -> Result<(), StoreError> {
        Ok(self
            .db
            .process(RescheduleRetryTask {
                id,
                attempt_count,
                next_attempt_at,
                last_error: last_error.to_string(),
            })
            .await?)
    }

    async fn complete(&self, id: Uuid, attempt_count: i32) -> Result<(), StoreError> {
        Ok(self
            .db
            .process(CompleteRetryTask { id, attempt_count })
            .await?)
    }

    async fn dead_letter(&self, id: Uuid, attempt_count: i32, last_error: &str) -> Result<(), StoreError> {
        Ok(self
            .db
            .process(DeadLetterRetryTask {
                id,
                attempt_count,
                last_error: last_error.to_string(),
            })
            .await?)
    }

    async fn list(
        &self,
        status: Option<RetryTaskStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RetryTask>, StoreError> {
        Ok(self
            .db
            .process(ListRetryTasks {
                status,
                limit,
                offset,
            })
            .await?)
    }

    async fn requeue(&self, id: Uuid, next_attempt_at: OffsetDateTime) -> Result<Option<RetryTask>, StoreError> {
        Ok(self
            .db
            .process(RequeueRetryTask { id, next_attempt_at })
            .await?)
    }
}
