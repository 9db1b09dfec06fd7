//! Direct-sign H5 flow: one signed form post, `h5_pay_url` back.

use std::sync::Arc;

use async_trait::async_trait;
use telebirr_sdk::config::{C2bConfig, TelebirrConfig};
use telebirr_sdk::objects::c2b::{
    API_VERSION, BizContent, CHARSET_UTF8, FORMAT_JSON, H5PayEnvelope, H5PayResponse,
    METHOD_H5_PAY, passback_for_order,
};
use telebirr_sdk::objects::callback::GATEWAY_TIME_FORMAT;
use telebirr_sdk::objects::format_amount;
use telebirr_sdk::signing::GatewaySigner;
use telebirr_sdk::signing::gateway::SIGN_TYPE_RSA2;
use time::UtcOffset;
use time::macros::offset;
use tracing::{error, info, warn};

use super::transport::{GatewayRequest, GatewayTransport, RequestBody};
use super::{CreateOrder, GatewayError, PaymentGateway, truncate_body};
use crate::entities::GatewayFlow;
use crate::entities::gateway_orders::{GatewayOrder, GatewayOrderInsert};
use crate::store::LedgerStore;
use crate::utils::clock::Clock;
use crate::utils::merchant_id::{MonotonicMillis, merchant_order_id};

/// Envelope timestamps are East Africa Time.
pub const GATEWAY_UTC_OFFSET: UtcOffset = offset!(+3);

pub struct C2bGateway {
    app_id: String,
    timeout_express: String,
    currency: String,
    config: C2bConfig,
    signer: Arc<GatewaySigner>,
    transport: Arc<dyn GatewayTransport>,
    ledger: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    stamps: MonotonicMillis,
}

impl C2bGateway {
    pub fn new(
        settings: &TelebirrConfig,
        config: C2bConfig,
        signer: Arc<GatewaySigner>,
        transport: Arc<dyn GatewayTransport>,
        ledger: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            app_id: settings.app_id.clone(),
            timeout_express: settings.timeout_express.clone(),
            currency: settings.currency.clone(),
            config,
            signer,
            transport,
            ledger,
            clock,
            stamps: MonotonicMillis::new(),
        }
    }

    fn envelope(&self, out_trade_no: &str, request: &CreateOrder) -> Result<H5PayEnvelope, GatewayError> {
        let biz = BizContent {
            out_trade_no: out_trade_no.to_string(),
            subject: request.subject.clone(),
            body: request.body.clone(),
            total_amount: format_amount(request.amount),
            timeout_express: self.timeout_express.clone(),
            passback_params: passback_for_order(&request.order_id),
        };
        let biz_content = serde_json::to_string(&biz).map_err(|e| GatewayError::Encoding(e.to_string()))?;
        let timestamp = self
            .clock
            .now()
            .to_offset(GATEWAY_UTC_OFFSET)
            .format(GATEWAY_TIME_FORMAT)
            .map_err(|e| GatewayError::Encoding(e.to_string()))?;

        let mut envelope = H5PayEnvelope {
            appid: self.app_id.clone(),
            method: METHOD_H5_PAY.to_string(),
            format: FORMAT_JSON.to_string(),
            charset: CHARSET_UTF8.to_string(),
            sign_type: SIGN_TYPE_RSA2.to_string(),
            sign: String::new(),
            timestamp,
            version: API_VERSION.to_string(),
            notify_url: self.config.notify_url.to_string(),
            biz_content,
        };
        envelope.sign = self.signer.sign(envelope.params())?;
        Ok(envelope)
    }
}

#[async_trait]
impl PaymentGateway for C2bGateway {
    fn flow(&self) -> GatewayFlow {
        GatewayFlow::C2b
    }

    #[tracing::instrument(skip_all, fields(flow = "c2b", order_id = %request.order_id))]
    async fn create_order(&self, request: CreateOrder) -> Result<GatewayOrder, GatewayError> {
        request.validate()?;
        let out_trade_no = merchant_order_id(
            GatewayFlow::C2b,
            &request.order_id,
            self.stamps.next(self.clock.now()),
        );
        let envelope = self.envelope(&out_trade_no, &request)?;
        let form: Vec<(String, String)> = envelope
            .params()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let response = self
            .transport
            .send(GatewayRequest {
                url: self.config.unified_order_url.clone(),
                bearer_token: None,
                basic_auth: None,
                body: RequestBody::Form(form),
            })
            .await?;
        if !response.is_success() {
            return Err(GatewayError::Rejected {
                code: format!("http_{}", response.status),
                message: truncate_body(&response.body),
            });
        }

        let parsed: H5PayResponse = serde_json::from_str(&response.body)
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        if !parsed.is_success() {
            warn!(code = %parsed.code, msg = %parsed.error_message(), "H5 order rejected");
            return Err(GatewayError::Rejected {
                code: parsed.code.clone(),
                message: parsed.error_message().to_string(),
            });
        }
        if !parsed.out_trade_no.is_empty() && parsed.out_trade_no != out_trade_no {
            return Err(GatewayError::MalformedResponse(format!(
                "response echoes out_trade_no {} for {}",
                parsed.out_trade_no, out_trade_no
            )));
        }

        let order = self
            .ledger
            .insert_gateway_order(GatewayOrderInsert {
                flow: GatewayFlow::C2b,
                order_id: request.order_id,
                correlation_id: out_trade_no.clone(),
                merchant_order_id: out_trade_no.clone(),
                amount: request.amount,
                currency: self.currency.clone(),
                subject: request.subject,
                body: request.body,
                checkout_url: parsed.h5_pay_url,
                trade_no: Some(parsed.trade_no).filter(|t| !t.is_empty()),
            })
            .await
            .inspect_err(|e| {
                error!(
                    correlation_id = %out_trade_no,
                    merchant_order_id = %out_trade_no,
                    error = %e,
                    "Gateway accepted order but ledger write failed"
                )
            })?;

        info!(
            correlation_id = %order.correlation_id,
            amount = %order.amount,
            "C2B order created"
        );
        Ok(order)
    }
}
