//! Domain error types.

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Item has no product ID.
    #[error("Product ID is required")]
    MissingProductId,

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Invalid price.
    #[error("Invalid price: {cents} cents (cannot be negative)")]
    InvalidPrice { cents: i64 },

    /// The order is already completed and cannot be completed again.
    #[error("Order already completed")]
    AlreadyCompleted,

    /// The order is in a terminal status that does not allow completion.
    #[error("Cannot complete order in status {status}")]
    CannotComplete { status: crate::OrderStatus },
}
