use std::time::Duration;

/// Schedule of the reconciliation retry queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Delay before the first retry; doubles on every further attempt.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Extra delay of up to this many percent, drawn per attempt.
    pub jitter_percent: u32,
    /// Attempts after which a task is dead-lettered.
    pub max_attempts: i32,
    /// How often the worker polls for due tasks.
    pub poll_interval: Duration,
    /// Tasks claimed per poll.
    pub batch_size: i64,
    /// How long a claimed task stays invisible to other workers.
    pub lease: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60 * 60),
            jitter_percent: 20,
            max_attempts: 8,
            poll_interval: Duration::from_secs(5),
            batch_size: 16,
            lease: Duration::from_secs(120),
        }
    }
}
