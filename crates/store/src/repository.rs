//! The order repository port.

use async_trait::async_trait;
use common::OrderId;
use domain::Order;

use crate::Result;

/// Storage contract for orders.
///
/// The concurrency core never touches storage directly; it receives and
/// returns in-memory order values and leaves persistence to callers of
/// this port.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts a new order. Fails if an order with the same ID exists.
    async fn save(&self, order: Order) -> Result<()>;

    /// Looks up an order by ID. Absence is not an error.
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>>;

    /// Replaces a stored order. Fails if the order does not exist.
    async fn update(&self, order: Order) -> Result<()>;

    /// Removes an order. Fails if the order does not exist.
    async fn delete(&self, id: OrderId) -> Result<()>;

    /// Returns all stored orders, in no particular order.
    async fn list_all(&self) -> Result<Vec<Order>>;
}
