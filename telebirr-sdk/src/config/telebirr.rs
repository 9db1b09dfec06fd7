//! Gateway endpoints and merchant identity.

use std::time::Duration;
use url::Url;

/// Default timeout for a single outbound gateway call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Payment window sent with every order.
pub const DEFAULT_TIMEOUT_EXPRESS: &str = "30m";
pub const DEFAULT_CURRENCY: &str = "ETB";

/// Settings shared by both flows plus the per-flow sections.
///
/// A flow whose section is absent is disabled: its create endpoint answers
/// with an error and its webhook route is not mounted.
#[derive(Debug, Clone)]
pub struct TelebirrConfig {
    pub app_id: String,
    pub request_timeout: Duration,
    pub timeout_express: String,
    pub currency: String,
    pub b2b: Option<B2bConfig>,
    pub c2b: Option<C2bConfig>,
}

/// Token-based flow.
#[derive(Debug, Clone)]
pub struct B2bConfig {
    /// Client secret for the client-credentials grant.
    pub app_secret: String,
    pub token_url: Url,
    pub preorder_url: Url,
    pub web_checkout_url: Url,
    pub notify_url: Url,
    pub return_url: Option<Url>,
}

/// Direct-sign H5 flow.
#[derive(Debug, Clone)]
pub struct C2bConfig {
    pub unified_order_url: Url,
    pub notify_url: Url,
    pub return_url: Option<Url>,
}

impl TelebirrConfig {
    /// Minimal config with default timeout, payment window and currency.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            timeout_express: DEFAULT_TIMEOUT_EXPRESS.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            b2b: None,
            c2b: None,
        }
    }
}
