//! Payment processors.
//!
//! - `Reconciler`: applies a gateway outcome to the gateway and business order
//! - `CallbackProcessor`: authenticates and reconciles inbound callbacks,
//!   deferring failures to the retry queue
//! - `RetryWorker`: re-runs deferred reconciliations with backoff

pub mod callback;
pub mod reconciler;
pub mod retry_worker;

#[cfg(test)]
pub(crate) mod testing;

pub use callback::{CallbackError, CallbackOutcome, CallbackProcessor};
pub use reconciler::{ReconcileOutcome, Reconciler, RefundError, RefundOutcome};
pub use retry_worker::{RetryWorker, RunSummary, TaskResult};
