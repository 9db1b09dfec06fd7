//! Application state shared across all request handlers.

use std::sync::Arc;

use telebirr_core::gateway::{B2bGateway, C2bGateway, GatewayTransport, PaymentGateway};
use telebirr_core::processors::{CallbackProcessor, Reconciler};
use telebirr_core::store::{LedgerStore, RetryStore};
use telebirr_core::utils::clock::Clock;
use telebirr_sdk::config::{RetryConfig, TelebirrConfig};
use telebirr_sdk::signing::GatewaySigner;

use crate::config::SharedConfig;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub retries: Arc<dyn RetryStore>,
    /// `None` when the flow is not configured.
    pub b2b: Option<Arc<dyn PaymentGateway>>,
    pub c2b: Option<Arc<dyn PaymentGateway>>,
    pub callbacks: Arc<CallbackProcessor>,
    pub reconciler: Reconciler,
    pub clock: Arc<dyn Clock>,
    /// Secrets that can be reloaded via SIGHUP.
    pub config: SharedConfig,
}

/// Everything needed to wire an [`AppState`].
pub struct Components {
    pub ledger: Arc<dyn LedgerStore>,
    pub retries: Arc<dyn RetryStore>,
    pub transport: Arc<dyn GatewayTransport>,
    pub clock: Arc<dyn Clock>,
    pub signer: Arc<GatewaySigner>,
}

impl AppState {
    pub fn new(
        components: Components,
        telebirr: &TelebirrConfig,
        retry: RetryConfig,
        config: SharedConfig,
    ) -> Self {
        let Components {
            ledger,
            retries,
            transport,
            clock,
            signer,
        } = components;

        let b2b = telebirr.b2b.clone().map(|b2b| {
            Arc::new(B2bGateway::new(
                telebirr,
                b2b,
                signer.clone(),
                transport.clone(),
                ledger.clone(),
                clock.clone(),
            )) as Arc<dyn PaymentGateway>
        });
        let c2b = telebirr.c2b.clone().map(|c2b| {
            Arc::new(C2bGateway::new(
                telebirr,
                c2b,
                signer.clone(),
                transport.clone(),
                ledger.clone(),
                clock.clone(),
            )) as Arc<dyn PaymentGateway>
        });
        let callbacks = Arc::new(CallbackProcessor::new(
            signer,
            ledger.clone(),
            retries.clone(),
            clock.clone(),
            retry.into(),
        ));

        Self {
            reconciler: Reconciler::new(ledger.clone()),
            ledger,
            retries,
            b2b,
            c2b,
            callbacks,
            clock,
            config,
        }
    }
}
