//! Direct-sign H5 (C2B) flow envelopes.
//!
//! The order is submitted as a form whose `biz_content` field is itself a
//! JSON document. The envelope fields, `biz_content` included as a string,
//! are what gets signed.

use serde::{Deserialize, Serialize};

use crate::signing::gateway::{SIGN_FIELD, SIGN_TYPE_FIELD};

pub const METHOD_H5_PAY: &str = "telebirr.payment.h5pay";
pub const FORMAT_JSON: &str = "JSON";
pub const CHARSET_UTF8: &str = "utf-8";
pub const API_VERSION: &str = "1.0";
/// Response code of a successful H5 order.
pub const H5_PAY_SUCCESS_CODE: &str = "10000";

/// Business part of an H5 order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BizContent {
    pub out_trade_no: String,
    pub subject: String,
    pub body: String,
    pub total_amount: String,
    pub timeout_express: String,
    pub passback_params: String,
}

/// `passback_params` value echoing the internal order id.
pub fn passback_for_order(order_id: &str) -> String {
    format!("order_id={order_id}")
}

/// Form envelope of an H5 order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct H5PayEnvelope {
    pub appid: String,
    pub method: String,
    pub format: String,
    pub charset: String,
    pub sign_type: String,
    pub sign: String,
    pub timestamp: String,
    pub version: String,
    pub notify_url: String,
    pub biz_content: String,
}

impl H5PayEnvelope {
    pub fn params(&self) -> [(&'static str, &str); 10] {
        [
            ("appid", self.appid.as_str()),
            ("method", self.method.as_str()),
            ("format", self.format.as_str()),
            ("charset", self.charset.as_str()),
            (SIGN_TYPE_FIELD, self.sign_type.as_str()),
            (SIGN_FIELD, self.sign.as_str()),
            ("timestamp", self.timestamp.as_str()),
            ("version", self.version.as_str()),
            ("notify_url", self.notify_url.as_str()),
            ("biz_content", self.biz_content.as_str()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct H5PayResponse {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub sub_code: String,
    #[serde(default)]
    pub sub_msg: String,
    #[serde(default)]
    pub h5_pay_url: String,
    #[serde(default)]
    pub out_trade_no: String,
    #[serde(default)]
    pub trade_no: String,
}

impl H5PayResponse {
    pub fn is_success(&self) -> bool {
        self.code == H5_PAY_SUCCESS_CODE && !self.h5_pay_url.is_empty()
    }

    /// Most specific error text the gateway gave.
    pub fn error_message(&self) -> &str {
        if self.sub_msg.is_empty() {
            &self.msg
        } else {
            &self.sub_msg
        }
    }
}
