//! The order orchestrator.

use std::sync::Arc;
use std::time::Duration;

use common::OrderId;
use domain::{Order, OrderItem, OrderStatus};
use pool::{TaskKind, WorkerPool};
use store::OrderRepository;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::OrchestratorError;

/// Per-task wait budget, for batch items and streaming stages alike.
const TASK_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the streaming mode's outbound channel.
const STREAM_BUFFER: usize = 10;

/// Drives the worker pool in batch and streaming modes and composes the
/// repository with the pool for the status-update path.
pub struct OrderOrchestrator<R> {
    pool: Arc<WorkerPool>,
    repo: R,
}

impl<R: OrderRepository> OrderOrchestrator<R> {
    /// Creates an orchestrator over a running pool and a repository.
    pub fn new(pool: Arc<WorkerPool>, repo: R) -> Self {
        Self { pool, repo }
    }

    /// Creates a pending order, persists it, and returns it.
    #[tracing::instrument(skip(self, items), fields(user_id = %user_id))]
    pub async fn place_order(
        &self,
        user_id: common::UserId,
        items: Vec<OrderItem>,
    ) -> Result<Order, OrchestratorError> {
        let order = Order::new(user_id, items)?;
        self.repo.save(order.clone()).await?;
        metrics::counter!("orders_placed").increment(1);
        tracing::info!(order_id = %order.id(), total = %order.total(), "order placed");
        Ok(order)
    }

    /// Looks up an order by ID. Absence is not an error.
    pub async fn get_order(&self, id: OrderId) -> Result<Option<Order>, OrchestratorError> {
        Ok(self.repo.find_by_id(id).await?)
    }

    /// Returns every stored order.
    pub async fn list_orders(&self) -> Result<Vec<Order>, OrchestratorError> {
        Ok(self.repo.list_all().await?)
    }

    /// Cancels an order. A missing order is a silent no-op; an order in a
    /// terminal status is left untouched.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, id: OrderId) -> Result<(), OrchestratorError> {
        let Some(mut order) = self.repo.find_by_id(id).await? else {
            return Ok(());
        };
        order.cancel();
        self.repo.update(order).await?;
        Ok(())
    }

    /// Processes a batch of orders concurrently: one unit per order, each
    /// submitting a compute-total task and racing the result stream against
    /// the per-item timeout.
    ///
    /// A timed-out or unsubmittable order comes back marked `failed`
    /// locally, without involving the pool. All units are joined before
    /// returning; no partial results leak. When workers race, the returned
    /// orders may be permuted relative to the input.
    #[tracing::instrument(skip(self, orders), fields(count = orders.len()))]
    pub async fn process_batch(&self, orders: Vec<Order>) -> Vec<Order> {
        let started = std::time::Instant::now();
        let count = orders.len();
        let mut units = JoinSet::new();

        for (idx, order) in orders.into_iter().enumerate() {
            let pool = Arc::clone(&self.pool);
            units.spawn(async move {
                (idx, process_one(pool, order, TaskKind::ComputeTotal).await)
            });
        }

        let mut slots: Vec<Option<Order>> = std::iter::repeat_with(|| None).take(count).collect();
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((idx, order)) => slots[idx] = Some(order),
                Err(err) => tracing::error!(%err, "batch unit panicked"),
            }
        }

        metrics::histogram!("batch_duration_seconds").record(started.elapsed().as_secs_f64());
        slots.into_iter().flatten().collect()
    }

    /// Streams orders through the validate → compute-total → finalize
    /// pipeline.
    ///
    /// Each inbound order gets its own pipeline task that awaits one result
    /// per stage serially, then forwards the finalized order to the bounded
    /// outbound channel. The outbound channel closes only after every
    /// in-flight pipeline has joined. A stage that exceeds the task timeout
    /// marks the order `failed` and forwards it instead of stalling the
    /// pipeline indefinitely.
    pub fn stream_orders(&self, mut input: mpsc::Receiver<Order>) -> mpsc::Receiver<Order> {
        let (out_tx, out_rx) = mpsc::channel(STREAM_BUFFER);
        let pool = Arc::clone(&self.pool);

        tokio::spawn(async move {
            let mut pipelines = JoinSet::new();

            while let Some(order) = input.recv().await {
                let pool = Arc::clone(&pool);
                let out_tx = out_tx.clone();
                pipelines.spawn(async move {
                    let finished = run_pipeline(pool, order).await;
                    let _ = out_tx.send(finished).await;
                });
            }

            while pipelines.join_next().await.is_some() {}
            tracing::debug!("order stream drained");
        });

        out_rx
    }

    /// Updates an order's status through the pool.
    ///
    /// A missing order is a silent no-op. After submitting, the call waits
    /// for either a result from the pool or the caller's cancellation
    /// token. A `None` result or a closed stream is treated as a benign
    /// no-op — a result is not guaranteed to be delivered.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        cancel: &CancellationToken,
    ) -> Result<(), OrchestratorError> {
        let Some(order) = self.repo.find_by_id(id).await? else {
            tracing::debug!(order_id = %id, "order not found, nothing to update");
            return Ok(());
        };

        self.pool
            .submit(Some(order), TaskKind::UpdateStatus, Some(status))
            .await?;

        let results = self.pool.results();
        tokio::select! {
            result = results.recv() => match result {
                Some(Some(updated)) => {
                    self.repo.update(updated).await?;
                    Ok(())
                }
                // Nil result or closed stream: nothing to persist.
                _ => Ok(()),
            },
            () = cancel.cancelled() => Err(OrchestratorError::Cancelled),
        }
    }
}

/// Submits a single task and races the shared result stream against the
/// per-task timeout. Failure paths return the local copy marked `failed`.
async fn process_one(pool: Arc<WorkerPool>, order: Order, kind: TaskKind) -> Order {
    let results = pool.results();
    let mut local = order;

    if pool.submit(Some(local.clone()), kind, None).await.is_err() {
        tracing::warn!(order_id = %local.id(), "pool rejected submission");
        local.mark_failed();
        return local;
    }

    match tokio::time::timeout(TASK_TIMEOUT, results.recv()).await {
        Ok(Some(Some(processed))) => processed,
        Ok(_) => {
            // Nil result or closed stream.
            local.mark_failed();
            local
        }
        Err(_) => {
            tracing::warn!(order_id = %local.id(), kind = %kind, "task result timed out");
            metrics::counter!("orchestrator_task_timeouts").increment(1);
            local.mark_failed();
            local
        }
    }
}

/// Drives one order through the three pipeline stages serially.
///
/// Results are drawn from the pool's shared stream, so concurrent
/// pipelines may hand each other's orders onward; every order still passes
/// through each stage exactly once.
async fn run_pipeline(pool: Arc<WorkerPool>, order: Order) -> Order {
    let results = pool.results();
    let mut current = order;

    for kind in [TaskKind::Validate, TaskKind::ComputeTotal, TaskKind::Finalize] {
        if pool.submit(Some(current.clone()), kind, None).await.is_err() {
            current.mark_failed();
            return current;
        }

        match tokio::time::timeout(TASK_TIMEOUT, results.recv()).await {
            Ok(Some(Some(next))) => current = next,
            Ok(_) => {
                current.mark_failed();
                return current;
            }
            Err(_) => {
                tracing::warn!(order_id = %current.id(), stage = %kind, "pipeline stage timed out");
                metrics::counter!("orchestrator_task_timeouts").increment(1);
                current.mark_failed();
                return current;
            }
        }
    }

    current
}
