//! Token-based flow: access token, JSON pre-order, signed web-checkout URL.

use std::sync::Arc;

use async_trait::async_trait;
use telebirr_sdk::config::{B2bConfig, TelebirrConfig};
use telebirr_sdk::objects::b2b::{PreOrderRequest, PreOrderResponse};
use telebirr_sdk::objects::format_amount;
use telebirr_sdk::signing::GatewaySigner;
use telebirr_sdk::signing::gateway::{SIGN_FIELD, SIGN_TYPE_FIELD, SIGN_TYPE_RSA2};
use time::OffsetDateTime;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use super::token::TokenCache;
use super::transport::{GatewayRequest, GatewayTransport, RequestBody};
use super::{CreateOrder, GatewayError, PaymentGateway, truncate_body};
use crate::entities::GatewayFlow;
use crate::entities::gateway_orders::{GatewayOrder, GatewayOrderInsert};
use crate::store::LedgerStore;
use crate::utils::clock::Clock;
use crate::utils::merchant_id::{MonotonicMillis, merchant_order_id};

pub struct B2bGateway {
    app_id: String,
    timeout_express: String,
    currency: String,
    config: B2bConfig,
    signer: Arc<GatewaySigner>,
    transport: Arc<dyn GatewayTransport>,
    tokens: TokenCache,
    ledger: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    stamps: MonotonicMillis,
}

impl B2bGateway {
    pub fn new(
        settings: &TelebirrConfig,
        config: B2bConfig,
        signer: Arc<GatewaySigner>,
        transport: Arc<dyn GatewayTransport>,
        ledger: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tokens = TokenCache::new(
            transport.clone(),
            clock.clone(),
            config.token_url.clone(),
            settings.app_id.clone(),
            config.app_secret.clone(),
        );
        Self {
            app_id: settings.app_id.clone(),
            timeout_express: settings.timeout_express.clone(),
            currency: settings.currency.clone(),
            config,
            signer,
            transport,
            tokens,
            ledger,
            clock,
            stamps: MonotonicMillis::new(),
        }
    }

    /// Build the customer-facing checkout link for a prepay id.
    ///
    /// The query carries its own nonce and timestamp and is signed like any
    /// other request.
    pub fn checkout_url(
        &self,
        prepay_id: &str,
        merch_order_id: &str,
        now: OffsetDateTime,
    ) -> Result<Url, GatewayError> {
        let nonce = Uuid::new_v4().simple().to_string();
        let timestamp = now.unix_timestamp().to_string();
        let mut params = vec![
            ("prepay_id", prepay_id),
            ("merch_order_id", merch_order_id),
            ("appid", self.app_id.as_str()),
            ("nonce", nonce.as_str()),
            ("timestamp", timestamp.as_str()),
        ];
        let sign = self.signer.sign(params.iter().copied())?;
        params.push((SIGN_FIELD, sign.as_str()));
        params.push((SIGN_TYPE_FIELD, SIGN_TYPE_RSA2));

        let mut url = self.config.web_checkout_url.clone();
        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }

    async fn preorder(&self, request: &PreOrderRequest) -> Result<PreOrderResponse, GatewayError> {
        let token = self.tokens.token().await?;
        let body = serde_json::to_value(request).map_err(|e| GatewayError::Encoding(e.to_string()))?;
        let response = self
            .transport
            .send(GatewayRequest {
                url: self.config.preorder_url.clone(),
                bearer_token: Some(token.access_token),
                basic_auth: None,
                body: RequestBody::Json(body),
            })
            .await?;

        if response.status == 401 {
            self.tokens.invalidate().await;
        }
        if !response.is_success() {
            return Err(GatewayError::Rejected {
                code: format!("http_{}", response.status),
                message: truncate_body(&response.body),
            });
        }
        serde_json::from_str(&response.body).map_err(|e| GatewayError::MalformedResponse(e.to_string()))
    }

    /// Persist an order the gateway has already accepted.
    async fn record(
        &self,
        request: CreateOrder,
        prepay_id: &str,
        merch_order_id: &str,
        now: OffsetDateTime,
    ) -> Result<GatewayOrder, GatewayError> {
        let checkout_url = self.checkout_url(prepay_id, merch_order_id, now)?;
        let order = self
            .ledger
            .insert_gateway_order(GatewayOrderInsert {
                flow: GatewayFlow::B2b,
                order_id: request.order_id,
                correlation_id: prepay_id.to_string(),
                merchant_order_id: merch_order_id.to_string(),
                amount: request.amount,
                currency: self.currency.clone(),
                subject: request.subject,
                body: request.body,
                checkout_url: checkout_url.to_string(),
                trade_no: None,
            })
            .await?;
        Ok(order)
    }
}

#[async_trait]
impl PaymentGateway for B2bGateway {
    fn flow(&self) -> GatewayFlow {
        GatewayFlow::B2b
    }

    #[tracing::instrument(skip_all, fields(flow = "b2b", order_id = %request.order_id))]
    async fn create_order(&self, request: CreateOrder) -> Result<GatewayOrder, GatewayError> {
        request.validate()?;
        let now = self.clock.now();
        let merch_order_id = merchant_order_id(GatewayFlow::B2b, &request.order_id, self.stamps.next(now));

        let mut preorder = PreOrderRequest {
            appid: self.app_id.clone(),
            merch_order_id: merch_order_id.clone(),
            total_amount: format_amount(request.amount),
            subject: request.subject.clone(),
            body: request.body.clone(),
            notify_url: self.config.notify_url.to_string(),
            return_url: self
                .config
                .return_url
                .as_ref()
                .map(Url::to_string)
                .unwrap_or_default(),
            timeout_express: self.timeout_express.clone(),
            nonce: Uuid::new_v4().simple().to_string(),
            timestamp: now.unix_timestamp().to_string(),
            sign: String::new(),
            sign_type: SIGN_TYPE_RSA2.to_string(),
        };
        preorder.sign = self.signer.sign(preorder.params())?;

        let response = self.preorder(&preorder).await?;
        if !response.is_success() {
            warn!(code = %response.code, msg = %response.msg, "Pre-order rejected");
            return Err(GatewayError::Rejected {
                code: response.code,
                message: response.msg,
            });
        }

        let prepay_id = response.prepay_id;
        let order = self
            .record(request, &prepay_id, &merch_order_id, now)
            .await
            .inspect_err(|e| {
                error!(
                    correlation_id = %prepay_id,
                    merchant_order_id = %merch_order_id,
                    error = %e,
                    "Gateway accepted order but ledger write failed"
                )
            })?;

        info!(
            correlation_id = %order.correlation_id,
            merchant_order_id = %order.merchant_order_id,
            amount = %order.amount,
            "B2B order created"
        );
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::gateway_orders::GatewayOrderStatus;
    use crate::gateway::transport::testing::ScriptedTransport;
    use crate::store::StoreError;
    use crate::store::memory::MemoryStore;
    use crate::utils::clock::ManualClock;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::collections::BTreeMap;
    use telebirr_sdk::signing::test_keys;
    use time::macros::datetime;

    struct Fixture {
        gateway: B2bGateway,
        transport: Arc<ScriptedTransport>,
        store: MemoryStore,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(datetime!(2024-03-01 12:00:00 UTC)));
        let transport = Arc::new(ScriptedTransport::new());
        let store = MemoryStore::new(clock.clone());
        let settings = TelebirrConfig::new("app-1");
        let config = B2bConfig {
            app_secret: "s3cret".into(),
            token_url: Url::parse("https://gw.test/token").unwrap(),
            preorder_url: Url::parse("https://gw.test/preorder").unwrap(),
            web_checkout_url: Url::parse("https://checkout.gw.test/pay").unwrap(),
            notify_url: Url::parse("https://merchant.test/telebirr/b2b/notify").unwrap(),
            return_url: None,
        };
        let gateway = B2bGateway::new(
            &settings,
            config,
            Arc::new(test_keys::merchant_signer().unwrap()),
            transport.clone(),
            Arc::new(store.clone()),
            clock,
        );
        Fixture {
            gateway,
            transport,
            store,
        }
    }

    fn lunch() -> CreateOrder {
        CreateOrder {
            order_id: "42".into(),
            amount: Decimal::new(10050, 2),
            subject: "Lunch".into(),
            body: "Table 4".into(),
        }
    }

    #[tokio::test]
    async fn test_create_order_persists_pending_with_signed_checkout() {
        let f = fixture();
        f.transport
            .push_json(200, json!({"access_token": "tok", "expires_in": 3600}))
            .await;
        f.transport
            .push_json(200, json!({"prepay_id": "PP-1", "code": "0", "msg": "ok"}))
            .await;

        let order = f.gateway.create_order(lunch()).await.unwrap();
        assert_eq!(order.correlation_id, "PP-1");
        assert_eq!(order.status, GatewayOrderStatus::Pending);
        assert!(order.merchant_order_id.starts_with("REST_42_"));
        assert_eq!(f.store.gateway_order("PP-1").await.unwrap(), Some(order.clone()));

        // The checkout query is signed with the merchant key.
        let url = Url::parse(&order.checkout_url).unwrap();
        let query: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(query["prepay_id"], "PP-1");
        assert_eq!(query["sign_type"], "RSA2");
        let gateway_side = test_keys::gateway_signer().unwrap();
        assert!(gateway_side.verify(&query, &query["sign"]));

        // The pre-order went out with the bearer token and a valid signature.
        let requests = f.transport.requests().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].bearer_token.as_deref(), Some("tok"));
        let RequestBody::Json(body) = &requests[1].body else {
            panic!("pre-order must be JSON");
        };
        assert_eq!(body["total_amount"], "100.50");
        assert_eq!(body["timeout_express"], "30m");
        let fields: BTreeMap<String, String> = body
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().unwrap().to_string()))
            .collect();
        assert!(gateway_side.verify(&fields, &fields["sign"]));
    }

    #[tokio::test]
    async fn test_rejected_preorder_persists_nothing() {
        let f = fixture();
        f.transport
            .push_json(200, json!({"access_token": "tok", "expires_in": 3600}))
            .await;
        f.transport
            .push_json(200, json!({"code": "40001", "msg": "invalid sign"}))
            .await;

        let err = f.gateway.create_order(lunch()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { code, .. } if code == "40001"));
        assert!(f.store.gateway_orders_for("42").await.unwrap().is_empty());
        // Exactly one attempt, no automatic retry.
        assert_eq!(f.transport.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_ledger_failure_after_acceptance_is_surfaced() {
        let f = fixture();
        f.transport
            .push_json(200, json!({"access_token": "tok", "expires_in": 3600}))
            .await;
        f.transport
            .push_json(200, json!({"prepay_id": "PP-1", "code": "0"}))
            .await;
        f.store.faults().fail_next_order_inserts(1);

        let err = f.gateway.create_order(lunch()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Store(StoreError::Unavailable(_))));
        assert_eq!(f.store.gateway_order("PP-1").await.unwrap(), None);
        assert_eq!(f.transport.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_token_failure_is_creation_failure() {
        let f = fixture();
        f.transport.push_json(500, json!({"error": "down"})).await;
        let err = f.gateway.create_order(lunch()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Token(_)));
        assert_eq!(f.transport.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_token_cached_across_orders() {
        let f = fixture();
        f.transport
            .push_json(200, json!({"access_token": "tok", "expires_in": 3600}))
            .await;
        f.transport
            .push_json(200, json!({"prepay_id": "PP-1", "code": "0"}))
            .await;
        f.transport
            .push_json(200, json!({"prepay_id": "PP-2", "code": "0"}))
            .await;

        let first = f.gateway.create_order(lunch()).await.unwrap();
        let second = f.gateway.create_order(lunch()).await.unwrap();
        assert_ne!(first.merchant_order_id, second.merchant_order_id);
        assert_eq!(f.transport.requests().await.len(), 3);
        assert_eq!(f.store.gateway_orders_for("42").await.unwrap().len(), 2);
    }
}
