//! Order processing service entry point.
//!
//! Wires the worker pool, orchestrator, event monitor, and notification
//! group together, runs a demonstration workload, and tears everything
//! down in order on SIGINT/SIGTERM.

mod config;

use std::sync::Arc;
use std::time::Duration;

use common::UserId;
use domain::{Money, Notification, OrderItem};
use monitor::{EventKind, EventMonitor, NotificationGroup, OrderEvent};
use orchestrator::OrderOrchestrator;
use pool::WorkerPool;
use store::InMemoryOrderRepository;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn sample_items() -> Vec<OrderItem> {
    vec![
        OrderItem::new("SKU-1001", "Keyboard", 1, Money::from_cents(4999)),
        OrderItem::new("SKU-1002", "Mouse", 2, Money::from_dollars(20)),
    ]
}

/// Exercises both processing modes and the notification path once, so a
/// fresh deployment produces observable output immediately.
async fn run_demo_workload(
    orchestrator: &OrderOrchestrator<InMemoryOrderRepository>,
    monitor: &EventMonitor,
    notifications: &NotificationGroup,
) {
    let user = UserId::new();

    // Batch mode.
    let mut batch = Vec::new();
    for _ in 0..3 {
        match orchestrator.place_order(user, sample_items()).await {
            Ok(order) => {
                let event = OrderEvent::new(order.id(), user, EventKind::Created);
                if let Err(err) = monitor.publish(event).await {
                    tracing::warn!(%err, "created event not published");
                }
                batch.push(order);
            }
            Err(err) => tracing::error!(%err, "failed to place order"),
        }
    }
    let processed = orchestrator.process_batch(batch).await;
    tracing::info!(count = processed.len(), "batch processed");

    // Streaming mode.
    let (tx, rx) = mpsc::channel(10);
    let mut finished = orchestrator.stream_orders(rx);
    for _ in 0..2 {
        if let Ok(order) = orchestrator.place_order(user, sample_items()).await {
            let _ = tx.send(order).await;
        }
    }
    drop(tx);
    while let Some(order) = finished.recv().await {
        let event = OrderEvent::new(order.id(), user, EventKind::Completed)
            .with_payload(serde_json::json!({ "total_cents": order.total().cents() }));
        if let Err(err) = monitor.publish(event).await {
            tracing::warn!(%err, "completed event not published");
        }

        let message = format!("order {} completed, total {}", order.id(), order.total());
        let notification = Notification::new(user, message).with_email("customer@example.com");
        if let Err(err) = notifications
            .send(notification, Duration::from_millis(500))
            .await
        {
            tracing::warn!(%err, "notification not queued");
        }
    }
    tracing::info!("demo workload finished");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = Config::from_env();
    tracing::info!(?config, "starting order processor");

    let pool = Arc::new(WorkerPool::new(config.worker_count, config.queue_size));
    pool.start().expect("failed to start worker pool");

    let orchestrator = OrderOrchestrator::new(Arc::clone(&pool), InMemoryOrderRepository::new());

    let monitor = Arc::new(EventMonitor::new());
    monitor.start();

    let notifications = NotificationGroup::new(Arc::clone(&monitor));
    let group_cancel = CancellationToken::new();
    let group_handle = {
        let notifications = notifications.clone();
        let cancel = group_cancel.clone();
        tokio::spawn(async move { notifications.run(cancel).await })
    };

    run_demo_workload(&orchestrator, &monitor, &notifications).await;

    shutdown_signal().await;

    // Teardown order: notification workers first so no new events are
    // produced, then the monitor, then the pool.
    group_cancel.cancel();
    match group_handle.await {
        Ok(Ok(())) => tracing::info!("notification group exited cleanly"),
        Ok(Err(err)) => tracing::error!(%err, "notification group exited with error"),
        Err(err) => tracing::error!(%err, "notification group task failed"),
    }
    monitor.stop().await;
    pool.stop().await;

    tracing::info!("shut down gracefully");
}
