//! Store error types.

use common::OrderId;
use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No order exists with the given ID.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// An order with the given ID already exists.
    #[error("Order already exists: {0}")]
    AlreadyExists(OrderId),
}

/// Convenience type alias for repository results.
pub type Result<T> = std::result::Result<T, StoreError>;
