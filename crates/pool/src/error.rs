//! Worker pool error types.

use thiserror::Error;

/// Errors that can occur when interacting with the worker pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has been stopped; no further tasks are accepted.
    ///
    /// Submitting to a stopped pool is an ordinary, recoverable error so
    /// callers can handle shutdown races gracefully.
    #[error("Worker pool is stopped")]
    Stopped,

    /// The task queue stayed full past the submit budget.
    ///
    /// Backpressure is expected; a queue that never drains is not. The
    /// caller decides whether to retry or mark the work failed.
    #[error("Timed out submitting to the worker pool")]
    SubmitTimeout,
}
