//! Orchestrator error types.

use domain::OrderError;
use pool::PoolError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The worker pool rejected the submission.
    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    /// The repository failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A domain rule was violated.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The caller-supplied cancellation token fired mid-wait.
    ///
    /// Distinct from a timeout so callers can tell "gave up" apart from
    /// "asked to stop".
    #[error("Operation cancelled")]
    Cancelled,
}
