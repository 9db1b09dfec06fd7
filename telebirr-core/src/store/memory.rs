//! In-process store with the same transactional behavior as Postgres.
//!
//! A transaction takes the single state lock and works on a copy; commit
//! swaps the copy in, drop throws it away. That serializes transactions
//! more coarsely than row locks but gives the same all-or-nothing result.
//! [`FaultPlan`] injects storage failures at chosen points.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::types::Json;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{LedgerStore, LedgerTx, OrderService, RetryStore, StoreError};
use crate::entities::business_orders::{BusinessOrder, OrderPaymentStatus};
use crate::entities::gateway_notifications::{GatewayNotification, NotificationInsert};
use crate::entities::gateway_orders::{GatewayOrder, GatewayOrderInsert, GatewayOrderStatus};
use crate::entities::retry_tasks::{RetryTask, RetryTaskInsert, RetryTaskStatus};
use crate::utils::clock::{Clock, SystemClock};

#[derive(Debug, Clone, Default)]
struct State {
    gateway_orders: BTreeMap<String, GatewayOrder>,
    notifications: Vec<GatewayNotification>,
    business_orders: HashMap<String, BusinessOrder>,
    retry_tasks: BTreeMap<Uuid, RetryTask>,
}

/// Counters of upcoming operations that should fail.
#[derive(Debug, Default)]
pub struct FaultPlan {
    begin: AtomicU32,
    order_insert: AtomicU32,
    business_update: AtomicU32,
    commit: AtomicU32,
    notification_insert: AtomicU32,
    enqueue: AtomicU32,
}

impl FaultPlan {
    pub fn fail_next_begins(&self, n: u32) {
        self.begin.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_order_inserts(&self, n: u32) {
        self.order_insert.store(n, Ordering::SeqCst);
    }

    /// Fails the business-order update, which always runs after the gateway
    /// order update inside a reconciliation.
    pub fn fail_next_business_updates(&self, n: u32) {
        self.business_update.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_commits(&self, n: u32) {
        self.commit.store(n, Ordering::SeqCst);
    }

    /// Fails receipts recorded outside a transaction.
    pub fn fail_next_notification_inserts(&self, n: u32) {
        self.notification_insert.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_enqueues(&self, n: u32) {
        self.enqueue.store(n, Ordering::SeqCst);
    }

    fn trip(counter: &AtomicU32, what: &str) -> Result<(), StoreError> {
        match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
            Ok(_) => Err(StoreError::Unavailable(format!("injected {what} failure"))),
            Err(_) => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    faults: Arc<FaultPlan>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            faults: Arc::new(FaultPlan::default()),
            clock,
        }
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Stand in for a row of the restaurant's `orders` table.
    pub async fn seed_business_order(&self, id: &str, status: &str, total_amount: Option<Decimal>) {
        self.state.lock().await.business_orders.insert(
            id.to_string(),
            BusinessOrder {
                id: id.to_string(),
                status: status.to_string(),
                total_amount,
            },
        );
    }

    pub async fn business_order(&self, id: &str) -> Option<BusinessOrder> {
        self.state.lock().await.business_orders.get(id).cloned()
    }

    pub async fn retry_tasks(&self) -> Vec<RetryTask> {
        self.state.lock().await.retry_tasks.values().cloned().collect()
    }

    pub async fn all_notifications(&self) -> Vec<GatewayNotification> {
        self.state.lock().await.notifications.clone()
    }
}

fn notification_from(insert: NotificationInsert, received_at: OffsetDateTime) -> GatewayNotification {
    GatewayNotification {
        id: Uuid::now_v7(),
        flow: insert.flow,
        correlation_id: insert.correlation_id,
        trade_no: insert.trade_no,
        trade_status: insert.trade_status,
        amount: insert.amount,
        currency: insert.currency,
        passback_params: insert.passback_params,
        gmt_payment: insert.gmt_payment,
        signature: insert.signature,
        sign_type: insert.sign_type,
        payload: Json(insert.payload),
        processed: insert.processed,
        received_at,
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_gateway_order(&self, insert: GatewayOrderInsert) -> Result<GatewayOrder, StoreError> {
        FaultPlan::trip(&self.faults.order_insert, "gateway order insert")?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if state.gateway_orders.contains_key(&insert.correlation_id) {
            return Err(StoreError::DuplicateCorrelation(insert.correlation_id));
        }
        let order = GatewayOrder {
            id: Uuid::now_v7(),
            flow: insert.flow,
            order_id: insert.order_id,
            correlation_id: insert.correlation_id,
            merchant_order_id: insert.merchant_order_id,
            amount: insert.amount,
            currency: insert.currency,
            subject: insert.subject,
            body: insert.body,
            status: GatewayOrderStatus::Pending,
            checkout_url: insert.checkout_url,
            trade_no: insert.trade_no,
            created_at: now,
            updated_at: now,
        };
        state
            .gateway_orders
            .insert(order.correlation_id.clone(), order.clone());
        Ok(order)
    }

    async fn gateway_order(&self, correlation_id: &str) -> Result<Option<GatewayOrder>, StoreError> {
        Ok(self.state.lock().await.gateway_orders.get(correlation_id).cloned())
    }

    async fn gateway_orders_for(&self, order_id: &str) -> Result<Vec<GatewayOrder>, StoreError> {
        let state = self.state.lock().await;
        let mut orders: Vec<GatewayOrder> = state
            .gateway_orders
            .values()
            .filter(|o| o.order_id == order_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.created_at, o.id));
        Ok(orders)
    }

    async fn record_notification(&self, insert: NotificationInsert) -> Result<Uuid, StoreError> {
        FaultPlan::trip(&self.faults.notification_insert, "notification insert")?;
        let notification = notification_from(insert, self.clock.now());
        let id = notification.id;
        self.state.lock().await.notifications.push(notification);
        Ok(id)
    }

    async fn notifications_for(&self, correlation_id: &str) -> Result<Vec<GatewayNotification>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .iter()
            .filter(|n| n.correlation_id == correlation_id)
            .cloned()
            .collect())
    }

    async fn find_business_order(&self, id: &str) -> Result<Option<BusinessOrder>, StoreError> {
        Ok(self.business_order(id).await)
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        FaultPlan::trip(&self.faults.begin, "begin")?;
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryLedgerTx {
            guard,
            working,
            faults: self.faults.clone(),
            now: self.clock.now(),
        }))
    }
}

pub struct MemoryLedgerTx {
    guard: OwnedMutexGuard<State>,
    working: State,
    faults: Arc<FaultPlan>,
    now: OffsetDateTime,
}

#[async_trait]
impl OrderService for MemoryLedgerTx {
    async fn get_order(&mut self, id: &str) -> Result<Option<BusinessOrder>, StoreError> {
        Ok(self.working.business_orders.get(id).cloned())
    }

    async fn update_order_status(&mut self, id: &str, status: OrderPaymentStatus) -> Result<(), StoreError> {
        FaultPlan::trip(&self.faults.business_update, "business order update")?;
        let order = self
            .working
            .business_orders
            .get_mut(id)
            .ok_or_else(|| StoreError::BusinessOrderNotFound(id.to_string()))?;
        order.status = status.as_str().to_string();
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn lock_gateway_order(&mut self, correlation_id: &str) -> Result<Option<GatewayOrder>, StoreError> {
        Ok(self.working.gateway_orders.get(correlation_id).cloned())
    }

    async fn set_gateway_status(
        &mut self,
        id: Uuid,
        status: GatewayOrderStatus,
        trade_no: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = self.now;
        let order = self
            .working
            .gateway_orders
            .values_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| StoreError::GatewayOrderNotFound(id.to_string()))?;
        order.status = status;
        if let Some(trade_no) = trade_no {
            order.trade_no = Some(trade_no.to_string());
        }
        order.updated_at = now;
        Ok(())
    }

    async fn record_notification(&mut self, insert: NotificationInsert) -> Result<Uuid, StoreError> {
        let notification = notification_from(insert, self.now);
        let id = notification.id;
        self.working.notifications.push(notification);
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        FaultPlan::trip(&self.faults.commit, "commit")?;
        let MemoryLedgerTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl RetryStore for MemoryStore {
    async fn enqueue(&self, insert: RetryTaskInsert) -> Result<RetryTask, StoreError> {
        FaultPlan::trip(&self.faults.enqueue, "enqueue")?;
        let now = self.clock.now();
        let task = RetryTask {
            id: Uuid::now_v7(),
            notification_id: insert.notification_id,
            flow: insert.flow,
            correlation_id: insert.correlation_id,
            payload: Json(insert.payload),
            attempt_count: 0,
            next_attempt_at: insert.next_attempt_at,
            status: RetryTaskStatus::Pending,
            last_error: insert.last_error,
            leased_until: None,
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .await
            .retry_tasks
            .insert(task.id, task.clone());
        Ok(task)
    }

    async fn claim_due(
        &self,
        now: OffsetDateTime,
        limit: i64,
        lease_until: OffsetDateTime,
    ) -> Result<Vec<RetryTask>, StoreError> {
        let mut state = self.state.lock().await;
        let mut due: Vec<&mut RetryTask> = state
            .retry_tasks
            .values_mut()
            .filter(|t| {
                t.status == RetryTaskStatus::Pending
                    && t.next_attempt_at <= now
                    && t.leased_until.is_none_or(|l| l <= now)
            })
            .collect();
        due.sort_by_key(|t| t.next_attempt_at);
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(due
            .into_iter()
            .take(limit)
            .map(|t| {
                t.leased_until = Some(lease_until);
                t.updated_at = now;
                t.clone()
            })
            .collect())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        attempt_count: i32,
        next_attempt_at: OffsetDateTime,
        last_error: &str,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if let Some(task) = state
            .retry_tasks
            .get_mut(&id)
            .filter(|t| t.status == RetryTaskStatus::Pending)
        {
            task.attempt_count = attempt_count;
            task.next_attempt_at = next_attempt_at;
            task.last_error = Some(last_error.to_string());
            task.leased_until = None;
            task.updated_at = now;
        }
        Ok(())
    }

    async fn complete(&self, id: Uuid, attempt_count: i32) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if let Some(task) = state.retry_tasks.get_mut(&id) {
            task.status = RetryTaskStatus::Completed;
            task.attempt_count = attempt_count;
            task.leased_until = None;
            task.updated_at = now;
        }
        Ok(())
    }

    async fn dead_letter(&self, id: Uuid, attempt_count: i32, last_error: &str) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if let Some(task) = state.retry_tasks.get_mut(&id) {
            task.status = RetryTaskStatus::DeadLetter;
            task.attempt_count = attempt_count;
            task.last_error = Some(last_error.to_string());
            task.leased_until = None;
            task.updated_at = now;
        }
        Ok(())
    }

    async fn list(
        &self,
        status: Option<RetryTaskStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RetryTask>, StoreError> {
        let state = self.state.lock().await;
        let mut tasks: Vec<RetryTask> = state
            .retry_tasks
            .values()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(tasks.into_iter().skip(offset).take(limit).collect())
    }

    async fn requeue(&self, id: Uuid, next_attempt_at: OffsetDateTime) -> Result<Option<RetryTask>, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let Some(task) = state
            .retry_tasks
            .get_mut(&id)
            .filter(|t| t.status == RetryTaskStatus::DeadLetter)
        else {
            return Ok(None);
        };
        task.status = RetryTaskStatus::Pending;
        task.attempt_count = 0;
        task.next_attempt_at = next_attempt_at;
        task.leased_until = None;
        task.updated_at = now;
        Ok(Some(task.clone()))
    }
}
