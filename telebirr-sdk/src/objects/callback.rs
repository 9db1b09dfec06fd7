//! Asynchronous payment notifications pushed by the gateway.
//!
//! Both flows deliver a flat set of form parameters. The correlation id sits
//! in `prepay_id` (B2B) or `out_trade_no` (C2B); the rest is shared:
//! `trade_no`, `trade_status`, `total_amount`, `currency`, `gmt_payment`,
//! `passback_params`, `sign`, `sign_type`.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use super::GatewayFlow;
use crate::signing::gateway::{SIGN_FIELD, SIGN_TYPE_FIELD};

/// Timestamp layout used by the gateway (`2006-01-02 15:04:05`, local time).
pub const GATEWAY_TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Outcome reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TradeStatus {
    TradeSuccess,
    TradeClosed,
    WaitBuyerPay,
    /// Anything the gateway may add later. Kept verbatim.
    Other(String),
}

impl TradeStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "TRADE_SUCCESS" => TradeStatus::TradeSuccess,
            "TRADE_CLOSED" => TradeStatus::TradeClosed,
            "WAIT_BUYER_PAY" => TradeStatus::WaitBuyerPay,
            other => TradeStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TradeStatus::TradeSuccess => "TRADE_SUCCESS",
            TradeStatus::TradeClosed => "TRADE_CLOSED",
            TradeStatus::WaitBuyerPay => "WAIT_BUYER_PAY",
            TradeStatus::Other(raw) => raw,
        }
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The raw parameter set of one callback.
///
/// Verification runs over exactly these parameters, so nothing is dropped
/// or normalised on the way in. Serialized as a plain JSON object for the
/// retry queue payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackParams(BTreeMap<String, String>);

impl CallbackParams {
    /// Collect form pairs. When a key repeats, the first occurrence wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (k, v) in pairs {
            map.entry(k.into()).or_insert_with(|| v.into());
        }
        Self(map)
    }

    /// A parameter value, treating empty as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn correlation_id(&self, flow: GatewayFlow) -> Option<&str> {
        self.get(flow.correlation_field())
    }

    /// `merch_order_id` for B2B, `out_trade_no` for C2B.
    pub fn merchant_order_id(&self, flow: GatewayFlow) -> Option<&str> {
        match flow {
            GatewayFlow::B2b => self.get("merch_order_id"),
            GatewayFlow::C2b => self.get("out_trade_no"),
        }
    }

    pub fn trade_no(&self) -> Option<&str> {
        self.get("trade_no")
    }

    /// Missing status parses as `Other("")`.
    pub fn trade_status(&self) -> TradeStatus {
        TradeStatus::parse(self.get("trade_status").unwrap_or_default())
    }

    pub fn raw_trade_status(&self) -> &str {
        self.get("trade_status").unwrap_or_default()
    }

    /// `None` when absent or not a decimal number.
    pub fn total_amount(&self) -> Option<Decimal> {
        self.raw_total_amount()
            .and_then(|raw| Decimal::from_str(raw.trim()).ok())
    }

    pub fn raw_total_amount(&self) -> Option<&str> {
        self.get("total_amount")
    }

    pub fn currency(&self) -> Option<&str> {
        self.get("currency")
    }

    pub fn passback_params(&self) -> Option<&str> {
        self.get("passback_params")
    }

    /// The internal order id echoed back in `passback_params` (`order_id=<id>`).
    pub fn passback_order_id(&self) -> Option<&str> {
        self.passback_params()?
            .split('&')
            .find_map(|pair| pair.strip_prefix("order_id="))
            .filter(|id| !id.is_empty())
    }

    pub fn gmt_payment(&self) -> Option<PrimitiveDateTime> {
        self.get("gmt_payment")
            .and_then(|raw| PrimitiveDateTime::parse(raw, GATEWAY_TIME_FORMAT).ok())
    }

    pub fn signature(&self) -> Option<&str> {
        self.get(SIGN_FIELD)
    }

    pub fn sign_type(&self) -> Option<&str> {
        self.get(SIGN_TYPE_FIELD)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallbackParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}
