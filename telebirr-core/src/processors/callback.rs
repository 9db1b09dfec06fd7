//! Inbound gateway callbacks: authenticate, look up, record, reconcile.
//!
//! A callback that authenticates and names a known order is always
//! acknowledged. If reconciliation fails, the receipt is stored unprocessed
//! and a retry task takes over.

use std::sync::Arc;

use telebirr_sdk::objects::callback::CallbackParams;
use telebirr_sdk::signing::GatewaySigner;
use tracing::{error, warn};
use uuid::Uuid;

use super::reconciler::{ReconcileOutcome, Reconciler};
use crate::entities::GatewayFlow;
use crate::entities::gateway_notifications::NotificationInsert;
use crate::entities::retry_tasks::RetryTaskInsert;
use crate::store::{LedgerStore, RetryStore, StoreError};
use crate::utils::backoff::RetryPolicy;
use crate::utils::clock::Clock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Reconciled(ReconcileOutcome),
    /// Reconciliation failed and was handed to the retry queue.
    Deferred { retry_task_id: Uuid },
}

#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("callback signature did not verify")]
    Authentication,
    #[error("no gateway order for {0}")]
    NotFound(String),
    #[error("callback could not be stored: {0}")]
    Storage(#[from] StoreError),
}

pub struct CallbackProcessor {
    signer: Arc<GatewaySigner>,
    ledger: Arc<dyn LedgerStore>,
    retries: Arc<dyn RetryStore>,
    reconciler: Reconciler,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl CallbackProcessor {
    pub fn new(
        signer: Arc<GatewaySigner>,
        ledger: Arc<dyn LedgerStore>,
        retries: Arc<dyn RetryStore>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            signer,
            reconciler: Reconciler::new(ledger.clone()),
            ledger,
            retries,
            clock,
            policy,
        }
    }

    #[tracing::instrument(skip_all, fields(flow = %flow))]
    pub async fn handle(&self, flow: GatewayFlow, params: CallbackParams) -> Result<CallbackOutcome, CallbackError> {
        let signature = params.signature().unwrap_or_default();
        if !self.signer.verify(params.as_map(), signature) {
            warn!("Rejected callback with invalid signature");
            return Err(CallbackError::Authentication);
        }

        let Some(correlation_id) = params.correlation_id(flow.into()).map(str::to_string) else {
            error!(field = flow_field(flow), "Authenticated callback without correlation id");
            return Err(CallbackError::NotFound(String::new()));
        };
        match self.ledger.gateway_order(&correlation_id).await? {
            Some(order) if order.flow == flow => {}
            _ => {
                error!(correlation_id = %correlation_id, "Callback for unknown gateway order");
                return Err(CallbackError::NotFound(correlation_id));
            }
        }

        match self
            .reconciler
            .reconcile(flow, &correlation_id, &params, true)
            .await
        {
            Ok(outcome) => Ok(CallbackOutcome::Reconciled(outcome)),
            Err(reconcile_err) => {
                warn!(
                    correlation_id = %correlation_id,
                    error = %reconcile_err,
                    "Reconciliation failed, scheduling retry"
                );
                self.defer(flow, &correlation_id, params, reconcile_err)
                    .await
            }
        }
    }

    async fn defer(
        &self,
        flow: GatewayFlow,
        correlation_id: &str,
        params: CallbackParams,
        cause: StoreError,
    ) -> Result<CallbackOutcome, CallbackError> {
        let notification_id = self
            .ledger
            .record_notification(NotificationInsert::from_callback(flow, correlation_id, &params, false))
            .await?;
        let next_attempt_at = self.clock.now() + self.policy.delay(0);
        let task = self
            .retries
            .enqueue(RetryTaskInsert {
                notification_id: Some(notification_id),
                flow,
                correlation_id: correlation_id.to_string(),
                payload: params,
                next_attempt_at,
                last_error: Some(cause.to_string()),
            })
            .await?;
        Ok(CallbackOutcome::Deferred {
            retry_task_id: task.id,
        })
    }
}

fn flow_field(flow: GatewayFlow) -> &'static str {
    telebirr_sdk::objects::GatewayFlow::from(flow).correlation_field()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::entities::gateway_orders::GatewayOrderStatus;
    use crate::entities::retry_tasks::RetryTaskStatus;
    use crate::processors::testing::Harness;
    use rust_decimal::Decimal;

    async fn status_of(h: &Harness, correlation_id: &str) -> GatewayOrderStatus {
        h.store
            .gateway_order(correlation_id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn test_success_marks_gateway_and_business_order() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::B2b, "PP-1", "42").await;

        let outcome = h
            .callback_processor()
            .handle(GatewayFlow::B2b, h.b2b_callback("PP-1", "TRADE_SUCCESS"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CallbackOutcome::Reconciled(ReconcileOutcome::Applied {
                from: GatewayOrderStatus::Pending,
                to: GatewayOrderStatus::Completed,
            })
        );

        let order = h.store.gateway_order("PP-1").await.unwrap().unwrap();
        assert_eq!(order.status, GatewayOrderStatus::Completed);
        assert_eq!(order.trade_no.as_deref(), Some("TB-1001"));
        assert_eq!(h.store.business_order("42").await.unwrap().status, "paid");

        let notes = h.store.notifications_for("PP-1").await.unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].processed);
        assert_eq!(notes[0].trade_status, "TRADE_SUCCESS");
        assert!(h.store.retry_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_c2b_closed_cancels_business_order() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::C2b, "REST_C2B_42_1709285400000", "42")
            .await;

        h.callback_processor()
            .handle(
                GatewayFlow::C2b,
                h.c2b_callback("REST_C2B_42_1709285400000", "TRADE_CLOSED"),
            )
            .await
            .unwrap();
        assert_eq!(
            status_of(&h, "REST_C2B_42_1709285400000").await,
            GatewayOrderStatus::Failed
        );
        assert_eq!(h.store.business_order("42").await.unwrap().status, "cancelled");
    }

    #[tokio::test]
    async fn test_duplicate_callback_is_idempotent() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::B2b, "PP-1", "42").await;
        let processor = h.callback_processor();
        let callback = h.b2b_callback("PP-1", "TRADE_SUCCESS");

        processor
            .handle(GatewayFlow::B2b, callback.clone())
            .await
            .unwrap();
        // The restaurant moves on; a replay must not touch the business order again.
        h.store.seed_business_order("42", "served", None).await;

        let outcome = processor
            .handle(GatewayFlow::B2b, callback)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CallbackOutcome::Reconciled(ReconcileOutcome::Unchanged(GatewayOrderStatus::Completed))
        );
        assert_eq!(h.store.business_order("42").await.unwrap().status, "served");
        assert_eq!(h.store.notifications_for("PP-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_settled_order_ignores_contrary_status() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::B2b, "PP-1", "42").await;
        let processor = h.callback_processor();

        processor
            .handle(GatewayFlow::B2b, h.b2b_callback("PP-1", "TRADE_CLOSED"))
            .await
            .unwrap();
        let outcome = processor
            .handle(GatewayFlow::B2b, h.b2b_callback("PP-1", "TRADE_SUCCESS"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CallbackOutcome::Reconciled(ReconcileOutcome::Rejected {
                current: GatewayOrderStatus::Failed,
                requested: GatewayOrderStatus::Completed,
            })
        );
        assert_eq!(status_of(&h, "PP-1").await, GatewayOrderStatus::Failed);
        assert_eq!(h.store.business_order("42").await.unwrap().status, "cancelled");
    }

    #[tokio::test]
    async fn test_waiting_and_unknown_statuses_leave_order_pending() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::B2b, "PP-1", "42").await;
        let processor = h.callback_processor();

        for status in ["WAIT_BUYER_PAY", "TRADE_FINISHED"] {
            let outcome = processor
                .handle(GatewayFlow::B2b, h.b2b_callback("PP-1", status))
                .await
                .unwrap();
            assert_eq!(
                outcome,
                CallbackOutcome::Reconciled(ReconcileOutcome::Unchanged(GatewayOrderStatus::Pending))
            );
        }
        assert_eq!(status_of(&h, "PP-1").await, GatewayOrderStatus::Pending);
        assert_eq!(
            h.store.business_order("42").await.unwrap().status,
            "awaiting_payment"
        );
        let notes = h.store.notifications_for("PP-1").await.unwrap();
        assert_eq!(notes[1].trade_status, "TRADE_FINISHED");
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_recorded_not_applied() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::B2b, "PP-1", "42").await;
        let callback = h.signed(&[
            ("prepay_id", "PP-1"),
            ("trade_status", "TRADE_SUCCESS"),
            ("total_amount", "1.00"),
        ]);

        let outcome = h
            .callback_processor()
            .handle(GatewayFlow::B2b, callback)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CallbackOutcome::Reconciled(ReconcileOutcome::AmountMismatch {
                expected: Decimal::new(10050, 2),
                reported: Decimal::new(100, 2),
            })
        );
        assert_eq!(status_of(&h, "PP-1").await, GatewayOrderStatus::Pending);
        assert_eq!(h.store.notifications_for("PP-1").await.unwrap().len(), 1);
        assert!(h.store.retry_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_amount_is_recorded_not_applied() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::B2b, "PP-1", "42").await;
        let callback = h.signed(&[
            ("prepay_id", "PP-1"),
            ("trade_status", "TRADE_SUCCESS"),
            ("total_amount", "1,00"),
        ]);

        let outcome = h
            .callback_processor()
            .handle(GatewayFlow::B2b, callback)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CallbackOutcome::Reconciled(ReconcileOutcome::UnreadableAmount {
                expected: Decimal::new(10050, 2),
                reported: "1,00".to_string(),
            })
        );
        assert_eq!(status_of(&h, "PP-1").await, GatewayOrderStatus::Pending);
        assert_eq!(
            h.store.business_order("42").await.unwrap().status,
            "awaiting_payment"
        );
        let notes = h.store.notifications_for("PP-1").await.unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].processed);
        assert!(h.store.retry_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_success_without_amount_is_applied() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::B2b, "PP-1", "42").await;
        let callback = h.signed(&[("prepay_id", "PP-1"), ("trade_status", "TRADE_SUCCESS")]);

        let outcome = h
            .callback_processor()
            .handle(GatewayFlow::B2b, callback)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CallbackOutcome::Reconciled(ReconcileOutcome::Applied {
                from: GatewayOrderStatus::Pending,
                to: GatewayOrderStatus::Completed,
            })
        );
    }

    #[tokio::test]
    async fn test_tampered_callback_touches_nothing() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::B2b, "PP-1", "42").await;
        let mut callback = h.b2b_callback("PP-1", "TRADE_CLOSED");
        callback.insert("trade_status", "TRADE_SUCCESS");

        let err = h
            .callback_processor()
            .handle(GatewayFlow::B2b, callback)
            .await
            .unwrap_err();
        assert!(matches!(err, CallbackError::Authentication));
        assert_eq!(status_of(&h, "PP-1").await, GatewayOrderStatus::Pending);
        assert!(h.store.all_notifications().await.is_empty());
        assert!(h.store.retry_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_signature_is_authentication_error() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::B2b, "PP-1", "42").await;
        let callback = CallbackParams::from_pairs([("prepay_id", "PP-1"), ("trade_status", "TRADE_SUCCESS")]);
        let err = h
            .callback_processor()
            .handle(GatewayFlow::B2b, callback)
            .await
            .unwrap_err();
        assert!(matches!(err, CallbackError::Authentication));
    }

    #[tokio::test]
    async fn test_unknown_correlation_is_not_found() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::B2b, "PP-1", "42").await;

        let err = h
            .callback_processor()
            .handle(GatewayFlow::B2b, h.b2b_callback("PP-404", "TRADE_SUCCESS"))
            .await
            .unwrap_err();
        assert!(matches!(err, CallbackError::NotFound(id) if id == "PP-404"));
        assert!(h.store.all_notifications().await.is_empty());
        assert!(h.store.retry_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_flow_mismatch_is_not_found() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::B2b, "SHARED-1", "42").await;
        let err = h
            .callback_processor()
            .handle(GatewayFlow::C2b, h.c2b_callback("SHARED-1", "TRADE_SUCCESS"))
            .await
            .unwrap_err();
        assert!(matches!(err, CallbackError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_business_update_failure_rolls_back_and_enqueues_one_retry() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::B2b, "PP-1", "42").await;
        h.store.faults().fail_next_business_updates(1);
        let received_at = h.clock.now();

        let outcome = h
            .callback_processor()
            .handle(GatewayFlow::B2b, h.b2b_callback("PP-1", "TRADE_SUCCESS"))
            .await
            .unwrap();
        let CallbackOutcome::Deferred { retry_task_id } = outcome else {
            panic!("expected a deferred outcome, got {outcome:?}");
        };

        // Gateway order update was rolled back with the business update.
        assert_eq!(status_of(&h, "PP-1").await, GatewayOrderStatus::Pending);
        assert_eq!(
            h.store.business_order("42").await.unwrap().status,
            "awaiting_payment"
        );

        let tasks = h.store.retry_tasks().await;
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.id, retry_task_id);
        assert_eq!(task.status, RetryTaskStatus::Pending);
        assert_eq!(task.attempt_count, 0);
        assert_eq!(task.correlation_id, "PP-1");
        assert!(task.next_attempt_at >= received_at + Duration::from_secs(60));
        assert!(task.next_attempt_at <= received_at + Duration::from_secs(72));
        assert!(task.last_error.as_deref().unwrap_or_default().contains("injected"));

        let notes = h.store.notifications_for("PP-1").await.unwrap();
        assert_eq!(notes.len(), 1);
        assert!(!notes[0].processed);
        assert_eq!(task.notification_id, Some(notes[0].id));
        assert_eq!(task.payload.0, notes[0].payload.0);
    }

    #[tokio::test]
    async fn test_commit_failure_defers() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::B2b, "PP-1", "42").await;
        h.store.faults().fail_next_commits(1);

        let outcome = h
            .callback_processor()
            .handle(GatewayFlow::B2b, h.b2b_callback("PP-1", "TRADE_CLOSED"))
            .await
            .unwrap();
        assert!(matches!(outcome, CallbackOutcome::Deferred { .. }));
        assert_eq!(status_of(&h, "PP-1").await, GatewayOrderStatus::Pending);
        assert_eq!(h.store.retry_tasks().await.len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_failure_surfaces_storage_error() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::B2b, "PP-1", "42").await;
        h.store.faults().fail_next_business_updates(1);
        h.store.faults().fail_next_enqueues(1);

        let err = h
            .callback_processor()
            .handle(GatewayFlow::B2b, h.b2b_callback("PP-1", "TRADE_SUCCESS"))
            .await
            .unwrap_err();
        assert!(matches!(err, CallbackError::Storage(_)));
        assert!(h.store.retry_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_callbacks_apply_once() {
        let h = Harness::new().await;
        h.pending_order(GatewayFlow::B2b, "PP-1", "42").await;
        let processor = Arc::new(h.callback_processor());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let processor = processor.clone();
                let callback = h.b2b_callback("PP-1", "TRADE_SUCCESS");
                tokio::spawn(async move { processor.handle(GatewayFlow::B2b, callback).await })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                CallbackOutcome::Reconciled(ReconcileOutcome::Applied { .. }) => applied += 1,
                CallbackOutcome::Reconciled(ReconcileOutcome::Unchanged(_)) => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(status_of(&h, "PP-1").await, GatewayOrderStatus::Completed);
        assert_eq!(h.store.notifications_for("PP-1").await.unwrap().len(), 8);
    }
}
