//! Domain layer for the order pipeline.
//!
//! This crate provides the core domain types:
//! - Order entity with total invariant and completion guard
//! - OrderItem value object with validation
//! - OrderStatus state machine
//! - Notification value object for the notification workers

mod error;
mod notification;
mod order;
mod status;
mod value_objects;

pub use error::OrderError;
pub use notification::Notification;
pub use order::Order;
pub use status::OrderStatus;
pub use value_objects::{Money, OrderItem, ProductId};
