//! Storage seams of the payment core.
//!
//! [`LedgerStore`] owns gateway orders and notifications, [`RetryStore`] the
//! retry queue. Reconciliation runs inside a [`LedgerTx`], which also exposes
//! the business-order collaborator ([`OrderService`]) so that the gateway
//! order and the business order commit or roll back together.
//!
//! [`pg::PgStore`] is the production implementation; [`memory::MemoryStore`]
//! backs tests and can inject faults.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities::business_orders::{BusinessOrder, OrderPaymentStatus};
use crate::entities::gateway_notifications::{GatewayNotification, NotificationInsert};
use crate::entities::gateway_orders::{GatewayOrder, GatewayOrderInsert, GatewayOrderStatus};
use crate::entities::retry_tasks::{RetryTask, RetryTaskInsert, RetryTaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("correlation id already recorded: {0}")]
    DuplicateCorrelation(String),
    #[error("gateway order not found: {0}")]
    GatewayOrderNotFound(String),
    #[error("business order not found: {0}")]
    BusinessOrderNotFound(String),
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist a new `pending` order. Fails on a reused correlation id.
    async fn insert_gateway_order(&self, insert: GatewayOrderInsert) -> Result<GatewayOrder, StoreError>;

    async fn gateway_order(&self, correlation_id: &str) -> Result<Option<GatewayOrder>, StoreError>;

    /// All payment attempts for one business order, oldest first.
    async fn gateway_orders_for(&self, order_id: &str) -> Result<Vec<GatewayOrder>, StoreError>;

    /// Append a receipt outside any reconciliation transaction.
    async fn record_notification(&self, insert: NotificationInsert) -> Result<Uuid, StoreError>;

    async fn notifications_for(&self, correlation_id: &str) -> Result<Vec<GatewayNotification>, StoreError>;

    /// Read a business order outside any transaction.
    async fn find_business_order(&self, id: &str) -> Result<Option<BusinessOrder>, StoreError>;

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError>;
}

/// The business-order collaborator, bound to a reconciliation transaction.
#[async_trait]
pub trait OrderService: Send {
    /// Fetch and lock a business order.
    async fn get_order(&mut self, id: &str) -> Result<Option<BusinessOrder>, StoreError>;

    async fn update_order_status(&mut self, id: &str, status: OrderPaymentStatus) -> Result<(), StoreError>;
}

/// One reconciliation transaction. Dropping it without [`commit`](Self::commit)
/// rolls everything back.
#[async_trait]
pub trait LedgerTx: OrderService {
    /// Fetch and lock a gateway order.
    async fn lock_gateway_order(&mut self, correlation_id: &str) -> Result<Option<GatewayOrder>, StoreError>;

    async fn set_gateway_status(
        &mut self,
        id: Uuid,
        status: GatewayOrderStatus,
        trade_no: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn record_notification(&mut self, insert: NotificationInsert) -> Result<Uuid, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RetryStore: Send + Sync {
    async fn enqueue(&self, insert: RetryTaskInsert) -> Result<RetryTask, StoreError>;

    /// Lease due tasks until `lease_until`. A task is never handed to two
    /// claimers while its lease is live.
    async fn claim_due(
        &self,
        now: OffsetDateTime,
        limit: i64,
        lease_until: OffsetDateTime,
    ) -> Result<Vec<RetryTask>, StoreError>;

    async fn reschedule(
        &self,
        id: Uuid,
        attempt_count: i32,
        next_attempt_at: OffsetDateTime,
        last_error: &str,
    ) -> Result<(), StoreError>;

    async fn complete(&self, id: Uuid, attempt_count: i32) -> Result<(), StoreError>;

    async fn dead_letter(&self, id: Uuid, attempt_count: i32, last_error: &str) -> Result<(), StoreError>;

    async fn list(
        &self,
        status: Option<RetryTaskStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RetryTask>, StoreError>;

    /// Move a dead-lettered task back to `pending`. `None` when the task does
    /// not exist or is not dead-lettered.
    async fn requeue(&self, id: Uuid, next_attempt_at: OffsetDateTime) -> Result<Option<RetryTask>, StoreError>;
}
