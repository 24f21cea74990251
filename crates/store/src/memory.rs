use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::Order;
use tokio::sync::RwLock;

use crate::{OrderRepository, Result, StoreError};

/// In-memory order repository.
///
/// Owns its map behind a reader/writer lock; cloning the handle shares
/// the underlying storage. There is deliberately no process-wide
/// singleton — instances are constructed and injected.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Removes all stored orders.
    pub async fn clear(&self) {
        self.orders.write().await.clear();
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id()) {
            return Err(StoreError::AlreadyExists(order.id()));
        }
        tracing::debug!(order_id = %order.id(), "order saved");
        orders.insert(order.id(), order);
        Ok(())
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id).cloned())
    }

    async fn update(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if !orders.contains_key(&order.id()) {
            return Err(StoreError::NotFound(order.id()));
        }
        orders.insert(order.id(), order);
        Ok(())
    }

    async fn delete(&self, id: OrderId) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::UserId;
    use domain::{Money, OrderItem, OrderStatus};

    fn order() -> Order {
        Order::new(
            UserId::new(),
            vec![OrderItem::new("SKU-001", "Widget", 2, Money::from_cents(1000))],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn save_and_find() {
        let repo = InMemoryOrderRepository::new();
        let order = order();
        let id = order.id();

        repo.save(order).await.unwrap();

        let found = repo.find_by_id(id).await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().id(), id);
    }

    #[tokio::test]
    async fn save_duplicate_fails() {
        let repo = InMemoryOrderRepository::new();
        let order = order();

        repo.save(order.clone()).await.unwrap();
        let result = repo.save(order).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn find_missing_is_none_not_error() {
        let repo = InMemoryOrderRepository::new();
        let found = repo.find_by_id(OrderId::new()).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn update_replaces_stored_order() {
        let repo = InMemoryOrderRepository::new();
        let mut order = order();
        let id = order.id();
        repo.save(order.clone()).await.unwrap();

        order.force_status(OrderStatus::Processing);
        repo.update(order).await.unwrap();

        let found = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(found.status(), OrderStatus::Processing);
    }

    #[tokio::test]
    async fn update_missing_fails() {
        let repo = InMemoryOrderRepository::new();
        let result = repo.update(order()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_removes_order() {
        let repo = InMemoryOrderRepository::new();
        let order = order();
        let id = order.id();
        repo.save(order).await.unwrap();

        repo.delete(id).await.unwrap();
        assert!(repo.find_by_id(id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete(id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_all_returns_every_order() {
        let repo = InMemoryOrderRepository::new();
        repo.save(order()).await.unwrap();
        repo.save(order()).await.unwrap();
        repo.save(order()).await.unwrap();

        assert_eq!(repo.list_all().await.unwrap().len(), 3);
        assert_eq!(repo.count().await, 3);
    }

    #[tokio::test]
    async fn clone_shares_storage() {
        let repo = InMemoryOrderRepository::new();
        let handle = repo.clone();
        repo.save(order()).await.unwrap();
        assert_eq!(handle.count().await, 1);
    }
}
