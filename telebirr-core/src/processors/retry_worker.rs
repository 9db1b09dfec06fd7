//! Background worker draining the reconciliation retry queue.
//!
//! Every poll leases a batch of due tasks and re-runs reconciliation from
//! the stored callback payload. A failed attempt is rescheduled with
//! exponential backoff; a task that exhausts its attempts is dead-lettered
//! and stays in the table for operators.

use std::sync::Arc;
use std::time::Duration;

use kanau::processor::Processor;
use telebirr_sdk::config::RetryConfig;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::reconciler::{ReconcileOutcome, Reconciler};
use crate::entities::retry_tasks::RetryTask;
use crate::store::{RetryStore, StoreError};
use crate::utils::backoff::RetryPolicy;
use crate::utils::clock::Clock;

/// What happened to one claimed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    Completed(ReconcileOutcome),
    Rescheduled { attempt_count: i32 },
    DeadLettered { attempt_count: i32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub claimed: usize,
    pub completed: usize,
    pub rescheduled: usize,
    pub dead_lettered: usize,
}

pub struct RetryWorker {
    retries: Arc<dyn RetryStore>,
    reconciler: Reconciler,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    poll_interval: Duration,
    batch_size: i64,
    lease: Duration,
}

impl RetryWorker {
    pub fn new(
        retries: Arc<dyn RetryStore>,
        reconciler: Reconciler,
        clock: Arc<dyn Clock>,
        config: RetryConfig,
    ) -> Self {
        Self {
            retries,
            reconciler,
            clock,
            policy: config.into(),
            poll_interval: config.poll_interval,
            batch_size: config.batch_size,
            lease: config.lease,
        }
    }

    /// Poll until shutdown is signaled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval = ?self.poll_interval,
            batch_size = self.batch_size,
            "RetryWorker started"
        );
        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("RetryWorker received shutdown signal");
                        break;
                    }
                }

                _ = tokio::time::sleep(self.poll_interval) => {
                    match self.run_once().await {
                        Ok(summary) if summary.claimed > 0 => info!(
                            claimed = summary.claimed,
                            completed = summary.completed,
                            rescheduled = summary.rescheduled,
                            dead_lettered = summary.dead_lettered,
                            "Retry batch processed"
                        ),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Failed to claim retry tasks"),
                    }
                }
            }
        }
        info!("RetryWorker shutdown complete");
    }

    /// Claim and process one batch of due tasks.
    pub async fn run_once(&self) -> Result<RunSummary, StoreError> {
        let now = self.clock.now();
        let tasks = self
            .retries
            .claim_due(now, self.batch_size, now + self.lease)
            .await?;
        let mut summary = RunSummary {
            claimed: tasks.len(),
            ..Default::default()
        };

        for task in tasks {
            let id = task.id;
            match self.process(task).await {
                Ok(TaskResult::Completed(_)) => summary.completed += 1,
                Ok(TaskResult::Rescheduled { .. }) => summary.rescheduled += 1,
                Ok(TaskResult::DeadLettered { .. }) => summary.dead_lettered += 1,
                // The lease runs out and the task is claimed again.
                Err(e) => warn!(task_id = %id, error = %e, "Could not record retry result"),
            }
        }
        Ok(summary)
    }
}

impl Processor<RetryTask> for RetryWorker {
    type Output = TaskResult;
    type Error = StoreError;

    #[tracing::instrument(skip_all, fields(task_id = %task.id, correlation_id = %task.correlation_id))]
    async fn process(&self, task: RetryTask) -> Result<TaskResult, StoreError> {
        let attempt_count = task.attempt_count.saturating_add(1);
        let result = self
            .reconciler
            .reconcile(task.flow, &task.correlation_id, &task.payload.0, false)
            .await;

        match result {
            Ok(outcome) => {
                self.retries.complete(task.id, attempt_count).await?;
                debug!(attempt_count, outcome = ?outcome, "Retry task completed");
                Ok(TaskResult::Completed(outcome))
            }
            Err(cause) if self.policy.is_exhausted(attempt_count) => {
                let last_error = cause.to_string();
                self.retries
                    .dead_letter(task.id, attempt_count, &last_error)
                    .await?;
                error!(
                    attempt_count,
                    error = %last_error,
                    "Retry task exhausted its attempts, moved to dead letter"
                );
                Ok(TaskResult::DeadLettered { attempt_count })
            }
            Err(cause) => {
                let last_error = cause.to_string();
                let delay = self.policy.delay(u32::try_from(attempt_count).unwrap_or(u32::MAX));
                let next_attempt_at = self.clock.now() + delay;
                self.retries
                    .reschedule(task.id, attempt_count, next_attempt_at, &last_error)
                    .await?;
                warn!(
                    attempt_count,
                    next_attempt_at = %next_attempt_at,
                    error = %last_error,
                    "Retry attempt failed, rescheduled"
                );
                Ok(TaskResult::Rescheduled { attempt_count })
            }
        }
    }
}
