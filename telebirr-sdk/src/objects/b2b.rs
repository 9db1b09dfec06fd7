//! Token-based (B2B) flow envelopes.

use serde::{Deserialize, Serialize};

use crate::signing::gateway::{SIGN_FIELD, SIGN_TYPE_FIELD};

/// Response code of a successful pre-order.
pub const PREORDER_SUCCESS_CODE: &str = "0";
/// Grant used to obtain an access token.
pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";

/// Access token issued by the client-credentials grant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Signed JSON body of a pre-order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreOrderRequest {
    pub appid: String,
    pub merch_order_id: String,
    pub total_amount: String,
    pub subject: String,
    pub body: String,
    pub notify_url: String,
    pub return_url: String,
    pub timeout_express: String,
    pub nonce: String,
    pub timestamp: String,
    pub sign: String,
    pub sign_type: String,
}

impl PreOrderRequest {
    /// Every field as a `(name, value)` pair, in wire naming.
    pub fn params(&self) -> [(&'static str, &str); 12] {
        [
            ("appid", self.appid.as_str()),
            ("merch_order_id", self.merch_order_id.as_str()),
            ("total_amount", self.total_amount.as_str()),
            ("subject", self.subject.as_str()),
            ("body", self.body.as_str()),
            ("notify_url", self.notify_url.as_str()),
            ("return_url", self.return_url.as_str()),
            ("timeout_express", self.timeout_express.as_str()),
            ("nonce", self.nonce.as_str()),
            ("timestamp", self.timestamp.as_str()),
            (SIGN_FIELD, self.sign.as_str()),
            (SIGN_TYPE_FIELD, self.sign_type.as_str()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PreOrderResponse {
    #[serde(default)]
    pub prepay_id: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub msg: String,
}

impl PreOrderResponse {
    pub fn is_success(&self) -> bool {
        self.code == PREORDER_SUCCESS_CODE && !self.prepay_id.is_empty()
    }
}
