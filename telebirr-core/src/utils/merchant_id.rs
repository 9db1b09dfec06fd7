//! Merchant order ids: `REST_{seed}_{millis}` and `REST_C2B_{seed}_{millis}`.

use std::sync::atomic::{AtomicI64, Ordering};

use time::OffsetDateTime;

use super::clock::unix_millis;
use crate::entities::GatewayFlow;

/// Hands out strictly increasing millisecond stamps.
///
/// Two calls within the same millisecond, or a clock that steps backwards,
/// still yield distinct increasing values.
#[derive(Debug, Default)]
pub struct MonotonicMillis {
    last: AtomicI64,
}

impl MonotonicMillis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, now: OffsetDateTime) -> i64 {
        let candidate = unix_millis(now);
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let next = candidate.max(prev.saturating_add(1));
            match self
                .last
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

pub fn merchant_order_id(flow: GatewayFlow, seed: &str, millis: i64) -> String {
    match flow {
        GatewayFlow::B2b => format!("REST_{seed}_{millis}"),
        GatewayFlow::C2b => format!("REST_C2B_{seed}_{millis}"),
    }
}
