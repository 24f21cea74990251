//! End-to-end tests for the orchestrator over a live worker pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::UserId;
use domain::{Money, Order, OrderItem, OrderStatus};
use orchestrator::OrderOrchestrator;
use pool::WorkerPool;
use store::{InMemoryOrderRepository, OrderRepository};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn order_with_cents(cents: i64) -> Order {
    Order::new(
        UserId::new(),
        vec![OrderItem::new("SKU-001", "Widget", 1, Money::from_cents(cents))],
    )
    .unwrap()
}

fn setup(workers: usize) -> (Arc<WorkerPool>, OrderOrchestrator<InMemoryOrderRepository>) {
    let pool = Arc::new(WorkerPool::new(workers, 64));
    pool.start().unwrap();
    let orch = OrderOrchestrator::new(Arc::clone(&pool), InMemoryOrderRepository::new());
    (pool, orch)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_computes_all_totals_concurrently() {
    let (pool, orch) = setup(2);

    let orders: Vec<Order> = (0..5)
        .map(|_| {
            Order::new(
                UserId::new(),
                vec![OrderItem::new("SKU-001", "Widget", 2, Money::from_cents(1000))],
            )
            .unwrap()
        })
        .collect();

    let started = Instant::now();
    let processed = orch.process_batch(orders).await;

    // Fan-out across 5 units and 2 workers; nowhere near the 2 s per-item
    // budget, let alone 5 of them back to back.
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(processed.len(), 5);
    for order in &processed {
        assert_eq!(order.total(), Money::from_cents(2000));
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    pool.stop().await;
}

#[tokio::test(start_paused = true)]
async fn batch_marks_orders_failed_when_pool_never_answers() {
    // A pool that was never started accepts submissions but produces no
    // results; every unit must hit its per-item timeout.
    let pool = Arc::new(WorkerPool::new(2, 16));
    let orch = OrderOrchestrator::new(Arc::clone(&pool), InMemoryOrderRepository::new());

    let orders = vec![
        order_with_cents(100),
        order_with_cents(200),
        order_with_cents(300),
    ];
    let processed = orch.process_batch(orders).await;

    assert_eq!(processed.len(), 3);
    for order in &processed {
        assert_eq!(order.status(), OrderStatus::Failed);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn streaming_finalizes_every_order() {
    let (pool, orch) = setup(2);

    let (tx, rx) = mpsc::channel(10);
    let mut out = orch.stream_orders(rx);

    for cents in [100, 200, 300, 400] {
        tx.send(order_with_cents(cents)).await.unwrap();
    }
    drop(tx);

    let mut totals = Vec::new();
    while let Some(order) = out.recv().await {
        assert_eq!(order.status(), OrderStatus::Completed);
        assert!(order.completed_at().is_some());
        totals.push(order.total().cents());
    }
    totals.sort_unstable();
    assert_eq!(totals, vec![100, 200, 300, 400]);

    pool.stop().await;
}

#[tokio::test(start_paused = true)]
async fn streaming_forwards_failed_orders_on_stalled_pool() {
    let pool = Arc::new(WorkerPool::new(1, 16));
    let orch = OrderOrchestrator::new(Arc::clone(&pool), InMemoryOrderRepository::new());

    let (tx, rx) = mpsc::channel(4);
    let mut out = orch.stream_orders(rx);

    tx.send(order_with_cents(100)).await.unwrap();
    tx.send(order_with_cents(200)).await.unwrap();
    drop(tx);

    let mut seen = 0;
    while let Some(order) = out.recv().await {
        assert_eq!(order.status(), OrderStatus::Failed);
        seen += 1;
    }
    assert_eq!(seen, 2);
}

#[tokio::test]
async fn update_status_round_trips_through_the_pool() {
    let (pool, orch) = setup(1);

    let order = orch
        .place_order(
            UserId::new(),
            vec![OrderItem::new("SKU-001", "Widget", 1, Money::from_cents(500))],
        )
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    orch.update_status(order.id(), OrderStatus::Cancelled, &cancel)
        .await
        .unwrap();

    let stored = orch.get_order(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Cancelled);

    pool.stop().await;
}

#[tokio::test]
async fn update_status_of_missing_order_is_a_noop() {
    let (pool, orch) = setup(1);

    let cancel = CancellationToken::new();
    let result = orch
        .update_status(common::OrderId::new(), OrderStatus::Cancelled, &cancel)
        .await;

    assert!(result.is_ok());
    pool.stop().await;
}

#[tokio::test(start_paused = true)]
async fn update_status_observes_cancellation() {
    // No workers running, so the result never arrives; the caller's token
    // must win the race.
    let pool = Arc::new(WorkerPool::new(1, 4));
    let repo = InMemoryOrderRepository::new();
    let order = order_with_cents(100);
    let id = order.id();
    repo.save(order).await.unwrap();
    let orch = OrderOrchestrator::new(Arc::clone(&pool), repo);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = orch.update_status(id, OrderStatus::Completed, &cancel).await;
    assert!(matches!(
        result,
        Err(orchestrator::OrchestratorError::Cancelled)
    ));
}

#[tokio::test]
async fn place_list_and_cancel_orders() {
    let (pool, orch) = setup(1);

    let a = orch
        .place_order(
            UserId::new(),
            vec![OrderItem::new("SKU-A", "Widget", 2, Money::from_cents(250))],
        )
        .await
        .unwrap();
    orch.place_order(
        UserId::new(),
        vec![OrderItem::new("SKU-B", "Gadget", 1, Money::from_cents(900))],
    )
    .await
    .unwrap();

    assert_eq!(a.total(), Money::from_cents(500));
    assert_eq!(orch.list_orders().await.unwrap().len(), 2);

    orch.cancel_order(a.id()).await.unwrap();
    let cancelled = orch.get_order(a.id()).await.unwrap().unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);

    // Cancelling a missing order is not an error.
    orch.cancel_order(common::OrderId::new()).await.unwrap();

    pool.stop().await;
}
