//! Fixtures shared by the processor tests.

use std::sync::Arc;

use rust_decimal::Decimal;
use telebirr_sdk::objects::callback::CallbackParams;
use telebirr_sdk::signing::{GatewaySigner, test_keys};
use time::macros::datetime;

use super::callback::CallbackProcessor;
use super::reconciler::Reconciler;
use crate::entities::GatewayFlow;
use crate::entities::gateway_orders::{GatewayOrder, GatewayOrderInsert};
use crate::store::LedgerStore;
use crate::store::memory::MemoryStore;
use crate::utils::backoff::RetryPolicy;
use crate::utils::clock::ManualClock;

pub const ORDER_AMOUNT: &str = "100.50";

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: MemoryStore,
    /// Verifies callbacks, as the merchant does.
    pub merchant: Arc<GatewaySigner>,
    /// Signs callbacks, as the gateway does.
    pub gateway: GatewaySigner,
    pub policy: RetryPolicy,
}

impl Harness {
    pub async fn new() -> Self {
        let clock = Arc::new(ManualClock::new(datetime!(2024-03-01 09:30:00 UTC)));
        let store = MemoryStore::new(clock.clone());
        Self {
            clock,
            store,
            merchant: Arc::new(test_keys::merchant_signer().unwrap()),
            gateway: test_keys::gateway_signer().unwrap(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(Arc::new(self.store.clone()))
    }

    pub fn callback_processor(&self) -> CallbackProcessor {
        CallbackProcessor::new(
            self.merchant.clone(),
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            self.clock.clone(),
            self.policy,
        )
    }

    /// A business order awaiting payment plus its pending gateway order.
    pub async fn pending_order(&self, flow: GatewayFlow, correlation_id: &str, order_id: &str) -> GatewayOrder {
        let amount: Decimal = ORDER_AMOUNT.parse().unwrap();
        self.store
            .seed_business_order(order_id, "awaiting_payment", Some(amount))
            .await;
        self.store
            .insert_gateway_order(GatewayOrderInsert {
                flow,
                order_id: order_id.to_string(),
                correlation_id: correlation_id.to_string(),
                merchant_order_id: format!("REST_{order_id}_1709285400000"),
                amount,
                currency: "ETB".to_string(),
                subject: "Table 4".to_string(),
                body: "2x injera".to_string(),
                checkout_url: format!("https://pay.test/checkout?id={correlation_id}"),
                trade_no: None,
            })
            .await
            .unwrap()
    }

    /// Sign a parameter set with the gateway key and attach `sign`/`sign_type`.
    pub fn signed(&self, pairs: &[(&str, &str)]) -> CallbackParams {
        let mut params = CallbackParams::from_pairs(pairs.iter().copied());
        let sig = self.gateway.sign(params.as_map()).unwrap();
        params.insert("sign", sig);
        params.insert("sign_type", "RSA2");
        params
    }

    pub fn b2b_callback(&self, prepay_id: &str, trade_status: &str) -> CallbackParams {
        self.signed(&[
            ("prepay_id", prepay_id),
            ("merch_order_id", "REST_42_1709285400000"),
            ("trade_no", "TB-1001"),
            ("trade_status", trade_status),
            ("total_amount", ORDER_AMOUNT),
            ("currency", "ETB"),
            ("gmt_payment", "2024-03-01 12:31:00"),
        ])
    }

    pub fn c2b_callback(&self, out_trade_no: &str, trade_status: &str) -> CallbackParams {
        self.signed(&[
            ("out_trade_no", out_trade_no),
            ("trade_no", "TB-2002"),
            ("trade_status", trade_status),
            ("total_amount", ORDER_AMOUNT),
            ("currency", "ETB"),
            ("passback_params", "order_id=42"),
        ])
    }
}
