//! Applies a verified gateway outcome to the gateway order and its business
//! order in one transaction.
//!
//! Shared by the callback path and the retry worker. The state machine is
//! `pending -> completed | failed` and `completed -> refunded`; a repeated
//! status is an idempotent no-op and every other move is rejected without
//! touching state.

use std::sync::Arc;

use rust_decimal::Decimal;
use telebirr_sdk::objects::callback::{CallbackParams, TradeStatus};
use tracing::{debug, info, warn};

use crate::entities::GatewayFlow;
use crate::entities::business_orders::OrderPaymentStatus;
use crate::entities::gateway_notifications::NotificationInsert;
use crate::entities::gateway_orders::{GatewayOrder, GatewayOrderStatus};
use crate::store::{LedgerStore, LedgerTx, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied {
        from: GatewayOrderStatus,
        to: GatewayOrderStatus,
    },
    /// Already in the requested state.
    Unchanged(GatewayOrderStatus),
    /// Not an allowed transition; nothing changed.
    Rejected {
        current: GatewayOrderStatus,
        requested: GatewayOrderStatus,
    },
    /// A success report for a different amount than was ordered. Recorded,
    /// not applied.
    AmountMismatch { expected: Decimal, reported: Decimal },
    /// A success report whose `total_amount` is not a number. Recorded, not
    /// applied.
    UnreadableAmount { expected: Decimal, reported: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    Refunded(GatewayOrder),
    AlreadyRefunded(GatewayOrder),
}

#[derive(Debug, thiserror::Error)]
pub enum RefundError {
    #[error("gateway order not found: {0}")]
    NotFound(String),
    #[error("invalid refund amount: {0}")]
    InvalidAmount(String),
    #[error("a {0} payment cannot be refunded")]
    NotRefundable(GatewayOrderStatus),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Internal status a gateway trade status asks for.
pub fn requested_status(trade_status: &TradeStatus) -> GatewayOrderStatus {
    match trade_status {
        TradeStatus::TradeSuccess => GatewayOrderStatus::Completed,
        TradeStatus::TradeClosed => GatewayOrderStatus::Failed,
        TradeStatus::WaitBuyerPay | TradeStatus::Other(_) => GatewayOrderStatus::Pending,
    }
}

fn business_status_for(status: GatewayOrderStatus) -> Option<OrderPaymentStatus> {
    match status {
        GatewayOrderStatus::Completed => Some(OrderPaymentStatus::Paid),
        GatewayOrderStatus::Failed => Some(OrderPaymentStatus::Cancelled),
        GatewayOrderStatus::Refunded => Some(OrderPaymentStatus::Refunded),
        GatewayOrderStatus::Pending => None,
    }
}

fn decide(order: &GatewayOrder, requested: GatewayOrderStatus, params: &CallbackParams) -> ReconcileOutcome {
    if order.status == requested {
        return ReconcileOutcome::Unchanged(requested);
    }
    if requested == GatewayOrderStatus::Refunded || !order.status.can_transition_to(requested) {
        return ReconcileOutcome::Rejected {
            current: order.status,
            requested,
        };
    }
    if requested == GatewayOrderStatus::Completed
        && let Some(raw) = params.raw_total_amount()
    {
        match params.total_amount() {
            Some(reported) if reported != order.amount => {
                return ReconcileOutcome::AmountMismatch {
                    expected: order.amount,
                    reported,
                };
            }
            Some(_) => {}
            None => {
                return ReconcileOutcome::UnreadableAmount {
                    expected: order.amount,
                    reported: raw.to_string(),
                };
            }
        }
    }
    ReconcileOutcome::Applied {
        from: order.status,
        to: requested,
    }
}

async fn apply_business_status(
    tx: &mut Box<dyn LedgerTx>,
    order: &GatewayOrder,
    status: OrderPaymentStatus,
) -> Result<(), StoreError> {
    if tx.get_order(&order.order_id).await?.is_none() {
        return Err(StoreError::BusinessOrderNotFound(order.order_id.clone()));
    }
    tx.update_order_status(&order.order_id, status).await
}

#[derive(Clone)]
pub struct Reconciler {
    ledger: Arc<dyn LedgerStore>,
}

impl Reconciler {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Reconcile one verified callback.
    ///
    /// With `record_receipt` the callback is also appended to the
    /// notification log as processed, inside the same transaction. Any
    /// error leaves both orders untouched.
    pub async fn reconcile(
        &self,
        flow: GatewayFlow,
        correlation_id: &str,
        params: &CallbackParams,
        record_receipt: bool,
    ) -> Result<ReconcileOutcome, StoreError> {
        let mut tx = self.ledger.begin().await?;
        let order = tx
            .lock_gateway_order(correlation_id)
            .await?
            .ok_or_else(|| StoreError::GatewayOrderNotFound(correlation_id.to_string()))?;

        if record_receipt {
            tx.record_notification(NotificationInsert::from_callback(flow, correlation_id, params, true))
                .await?;
        }

        let trade_status = params.trade_status();
        if let TradeStatus::Other(raw) = &trade_status {
            warn!(
                correlation_id = %correlation_id,
                trade_status = %raw,
                "Unknown trade status, treating as pending"
            );
        }

        let requested = requested_status(&trade_status);
        if requested == GatewayOrderStatus::Completed && params.raw_total_amount().is_none() {
            warn!(
                correlation_id = %correlation_id,
                expected = %order.amount,
                "Success callback carries no total_amount, amount unchecked"
            );
        }

        let outcome = decide(&order, requested, params);
        if let ReconcileOutcome::Applied { to, .. } = outcome {
            tx.set_gateway_status(order.id, to, params.trade_no()).await?;
            if let Some(business) = business_status_for(to) {
                apply_business_status(&mut tx, &order, business).await?;
            }
        }
        tx.commit().await?;

        match &outcome {
            ReconcileOutcome::Applied { from, to } => info!(
                correlation_id = %correlation_id,
                order_id = %order.order_id,
                from = %from,
                to = %to,
                "Gateway order reconciled"
            ),
            ReconcileOutcome::Unchanged(status) => debug!(
                correlation_id = %correlation_id,
                status = %status,
                "Callback repeats current status"
            ),
            ReconcileOutcome::Rejected { current, requested } => warn!(
                correlation_id = %correlation_id,
                current = %current,
                requested = %requested,
                "Ignoring callback that would move order out of a settled state"
            ),
            ReconcileOutcome::AmountMismatch { expected, reported } => warn!(
                correlation_id = %correlation_id,
                expected = %expected,
                reported = %reported,
                "Success callback amount differs from order amount, not applied"
            ),
            ReconcileOutcome::UnreadableAmount { expected, reported } => warn!(
                correlation_id = %correlation_id,
                expected = %expected,
                reported = %reported,
                "Success callback amount is not a number, not applied"
            ),
        }
        Ok(outcome)
    }

    /// Mark a completed payment refunded together with its business order.
    pub async fn refund(
        &self,
        correlation_id: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<RefundOutcome, RefundError> {
        if amount <= Decimal::ZERO {
            return Err(RefundError::InvalidAmount(format!("{amount} is not positive")));
        }

        let mut tx = self.ledger.begin().await?;
        let order = tx
            .lock_gateway_order(correlation_id)
            .await?
            .ok_or_else(|| RefundError::NotFound(correlation_id.to_string()))?;

        match order.status {
            GatewayOrderStatus::Refunded => {
                debug!(correlation_id = %correlation_id, "Refund repeated, nothing to do");
                return Ok(RefundOutcome::AlreadyRefunded(order));
            }
            GatewayOrderStatus::Completed => {}
            other => return Err(RefundError::NotRefundable(other)),
        }
        if amount > order.amount {
            return Err(RefundError::InvalidAmount(format!(
                "{amount} exceeds paid amount {}",
                order.amount
            )));
        }

        tx.set_gateway_status(order.id, GatewayOrderStatus::Refunded, None)
            .await?;
        apply_business_status(&mut tx, &order, OrderPaymentStatus::Refunded).await?;
        tx.commit().await?;

        info!(
            correlation_id = %correlation_id,
            order_id = %order.order_id,
            amount = %amount,
            reason = %reason,
            "Payment refunded"
        );
        let refunded = self
            .ledger
            .gateway_order(correlation_id)
            .await?
            .ok_or_else(|| RefundError::NotFound(correlation_id.to_string()))?;
        Ok(RefundOutcome::Refunded(refunded))
    }
}
