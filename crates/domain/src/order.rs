//! The order entity.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;
use crate::status::OrderStatus;
use crate::value_objects::{Money, OrderItem};

/// An order placed by a user.
///
/// Invariant: `total` always equals the sum of the item subtotals after
/// construction, after `add_item`/`remove_item`, and after any successful
/// compute step. Items are validated before they are merged in, so an
/// invalid item can never contribute to the total.
///
/// Status transitions through the domain operations (`complete`, `cancel`)
/// follow the [`OrderStatus`] state machine. The `force_*`/`mark_*` setters
/// deliberately bypass it: they are the unchecked primitives the worker
/// pool's task layer is built on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    items: Vec<OrderItem>,
    total: Money,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Creates a new pending order, validating every item.
    ///
    /// Fails on the first invalid item; no partial order is produced.
    pub fn new(user_id: UserId, items: Vec<OrderItem>) -> Result<Self, OrderError> {
        for item in &items {
            item.validate()?;
        }
        let total = items.iter().map(OrderItem::subtotal).sum();

        Ok(Self {
            id: OrderId::new(),
            user_id,
            items,
            total,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        })
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Adds an item to the order and recomputes the total.
    ///
    /// The item is validated first; an invalid item is rejected without
    /// touching the order.
    pub fn add_item(&mut self, item: OrderItem) -> Result<(), OrderError> {
        item.validate()?;
        self.items.push(item);
        self.recompute_total();
        Ok(())
    }

    /// Removes all items with the given product ID and recomputes the total.
    pub fn remove_item(&mut self, product_id: &str) {
        self.items.retain(|i| i.product_id.as_str() != product_id);
        self.recompute_total();
    }

    /// Recomputes `total` as the sum of item subtotals.
    ///
    /// Infallible: items are validated before they enter the order.
    pub fn recompute_total(&mut self) {
        self.total = self.items.iter().map(OrderItem::subtotal).sum();
    }

    /// Completes the order through the domain state machine.
    ///
    /// Returns [`OrderError::AlreadyCompleted`] if the order is already
    /// completed — re-completion is explicitly rejected at this level —
    /// and [`OrderError::CannotComplete`] from any other terminal status.
    pub fn complete(&mut self) -> Result<(), OrderError> {
        if self.status == OrderStatus::Completed {
            return Err(OrderError::AlreadyCompleted);
        }
        if !self.status.can_complete() {
            return Err(OrderError::CannotComplete {
                status: self.status,
            });
        }
        self.mark_completed();
        Ok(())
    }

    /// Cancels the order if its status allows it; no-op otherwise.
    pub fn cancel(&mut self) {
        if self.status.can_cancel() {
            self.status = OrderStatus::Cancelled;
        }
    }

    /// Sets the status unconditionally. Unchecked task-layer primitive.
    pub fn force_status(&mut self, status: OrderStatus) {
        self.status = status;
    }

    /// Marks the order completed and stamps the completion time,
    /// regardless of current status. Unchecked task-layer primitive.
    pub fn mark_completed(&mut self) {
        self.status = OrderStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Marks the order failed. Unchecked task-layer primitive.
    pub fn mark_failed(&mut self) {
        self.status = OrderStatus::Failed;
    }
}
