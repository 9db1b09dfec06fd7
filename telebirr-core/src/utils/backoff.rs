use std::time::Duration;

use rand::Rng;
use telebirr_sdk::config::RetryConfig;

/// Exponential backoff with bounded jitter for the reconciliation queue.
///
/// The delay before retry `n` (0-based) is `min(base * 2^n, max)` plus a
/// random extra of up to `jitter_percent` of that value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_percent: u32,
    pub max_attempts: i32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            jitter_percent: config.jitter_percent,
            max_attempts: config.max_attempts,
        }
    }
}

impl RetryPolicy {
    /// Delay without jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::rng())
    }

    pub fn delay_with<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_delay(attempt);
        let nominal_ms = u64::try_from(nominal.as_millis()).unwrap_or(u64::MAX);
        let max_jitter_ms = nominal_ms.saturating_mul(u64::from(self.jitter_percent)) / 100;
        if max_jitter_ms == 0 {
            return nominal;
        }
        nominal.saturating_add(Duration::from_millis(rng.random_range(0..=max_jitter_ms)))
    }

    /// Whether a task that has failed `attempt_count` times goes to the dead-letter state.
    pub fn is_exhausted(&self, attempt_count: i32) -> bool {
        attempt_count >= self.max_attempts
    }
}
