//! The worker pool.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use domain::{Order, OrderStatus};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::error::PoolError;
use crate::task::{OrderTask, TaskKind};

/// Ceiling on how long backpressure may hold a submitter.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything that must flip together when the pool stops.
///
/// The stopped flag and both channel ends live under one reader/writer
/// lock so a worker or submitter can never observe a half-closed pool.
struct PoolState {
    stopped: bool,
    tasks_tx: Option<mpsc::Sender<OrderTask>>,
    results_tx: Option<mpsc::Sender<Option<Order>>>,
    workers: Vec<JoinHandle<()>>,
}

/// A fixed set of long-lived workers pulling tasks from a bounded queue.
///
/// Lifecycle: Created → Running (after [`start`](Self::start)) → Stopping →
/// Stopped. `Stopped` is terminal; a stopped pool rejects submissions with
/// [`PoolError::Stopped`].
///
/// Results carry no cross-task ordering guarantee once more than one
/// worker is running; FIFO only holds per worker.
pub struct WorkerPool {
    state: RwLock<PoolState>,
    tasks_rx: Arc<Mutex<mpsc::Receiver<OrderTask>>>,
    results: ResultStream,
    worker_count: usize,
}

impl WorkerPool {
    /// Creates a pool with `worker_count` workers and a bounded queue.
    ///
    /// `queue_size` is clamped to at least 1: tokio channels have no
    /// rendezvous mode, so a zero-capacity pool degenerates to a one-slot
    /// queue, which still blocks the producer until a worker drains it.
    pub fn new(worker_count: usize, queue_size: usize) -> Self {
        let capacity = queue_size.max(1);
        let (tasks_tx, tasks_rx) = mpsc::channel(capacity);
        let (results_tx, results_rx) = mpsc::channel(capacity);

        Self {
            state: RwLock::new(PoolState {
                stopped: false,
                tasks_tx: Some(tasks_tx),
                results_tx: Some(results_tx),
                workers: Vec::new(),
            }),
            tasks_rx: Arc::new(Mutex::new(tasks_rx)),
            results: ResultStream {
                inner: Arc::new(Mutex::new(results_rx)),
            },
            worker_count,
        }
    }

    /// Spawns the pool's workers.
    ///
    /// A no-op (logged) on a stopped pool. Calling `start` twice spawns a
    /// second set of workers reading the same queue; callers are expected
    /// to start a pool once.
    pub fn start(&self) -> Result<(), PoolError> {
        let mut state = self.state.write().unwrap();

        if state.stopped {
            tracing::warn!("worker pool already stopped, not starting");
            return Ok(());
        }

        let Some(results_tx) = state.results_tx.clone() else {
            return Ok(());
        };

        for i in 0..self.worker_count {
            let worker_id = i + 1;
            let tasks_rx = Arc::clone(&self.tasks_rx);
            let results_tx = results_tx.clone();
            state
                .workers
                .push(tokio::spawn(worker_loop(worker_id, tasks_rx, results_tx)));
        }

        tracing::info!(workers = self.worker_count, "worker pool started");
        Ok(())
    }

    /// Enqueues a task for the given order.
    ///
    /// Blocks on a full queue until a worker makes room (backpressure),
    /// but never past the submit budget: a queue that stays full returns
    /// [`PoolError::SubmitTimeout`] instead of holding the caller
    /// indefinitely. Returns [`PoolError::Stopped`] if the pool has been
    /// stopped, also when the stop races the send.
    pub async fn submit(
        &self,
        order: Option<Order>,
        kind: TaskKind,
        target_status: Option<OrderStatus>,
    ) -> Result<(), PoolError> {
        let tx = {
            let state = self.state.read().unwrap();
            if state.stopped {
                return Err(PoolError::Stopped);
            }
            state.tasks_tx.clone().ok_or(PoolError::Stopped)?
        };

        let task = OrderTask {
            order,
            kind,
            target_status,
        };
        match tokio::time::timeout(SUBMIT_TIMEOUT, tx.send(task)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(PoolError::Stopped),
            Err(_) => {
                metrics::counter!("pool_submit_timeouts").increment(1);
                tracing::warn!(kind = %kind, "task queue full past the submit budget");
                Err(PoolError::SubmitTimeout)
            }
        }
    }

    /// Returns a receive-only handle on the result stream.
    ///
    /// Handles are cheap to clone and safe to read from concurrently;
    /// each result is delivered to exactly one reader.
    pub fn results(&self) -> ResultStream {
        self.results.clone()
    }

    /// Stops the pool: closes the task queue, lets in-flight tasks drain,
    /// joins all workers, then closes the result stream.
    ///
    /// Idempotent and safe to call concurrently with `submit` and itself;
    /// subsequent calls return immediately.
    pub async fn stop(&self) {
        let workers = {
            let mut state = self.state.write().unwrap();
            if state.stopped {
                return;
            }
            state.stopped = true;
            // Dropping the sender closes the queue; workers drain what is
            // already enqueued and exit.
            state.tasks_tx = None;
            std::mem::take(&mut state.workers)
        };

        for handle in workers {
            let _ = handle.await;
        }

        // All worker-held result senders are gone; dropping ours closes
        // the result stream.
        self.state.write().unwrap().results_tx = None;
        tracing::info!("worker pool stopped");
    }

    /// Returns true once `stop` has begun.
    pub fn is_stopped(&self) -> bool {
        self.state.read().unwrap().stopped
    }

    /// Returns the configured worker count.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

async fn worker_loop(
    worker_id: usize,
    tasks_rx: Arc<Mutex<mpsc::Receiver<OrderTask>>>,
    results_tx: mpsc::Sender<Option<Order>>,
) {
    loop {
        let task = tasks_rx.lock().await.recv().await;
        let Some(task) = task else {
            break;
        };

        let outcome = task.execute(worker_id);
        metrics::counter!("pool_tasks_processed").increment(1);

        if results_tx.send(outcome).await.is_err() {
            break;
        }
    }
    tracing::debug!(worker = worker_id, "worker exited");
}

/// Cloneable, receive-only view of the pool's result stream.
#[derive(Clone)]
pub struct ResultStream {
    inner: Arc<Mutex<mpsc::Receiver<Option<Order>>>>,
}

impl ResultStream {
    /// Receives the next completed task's order.
    ///
    /// The outer `None` means the stream is closed and fully drained; an
    /// inner `None` means the task carried no order (a benign outcome,
    /// not an error).
    pub async fn recv(&self) -> Option<Option<Order>> {
        self.inner.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::UserId;
    use domain::{Money, OrderItem};

    fn order() -> Order {
        Order::new(
            UserId::new(),
            vec![OrderItem::new("SKU-001", "Widget", 2, Money::from_cents(1000))],
        )
        .unwrap()
    }

    async fn drain(results: &ResultStream, n: usize) -> Vec<Option<Order>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(results.recv().await.expect("stream closed early"));
        }
        out
    }

    #[tokio::test]
    async fn submit_and_drain_with_one_worker() {
        let pool = WorkerPool::new(1, 16);
        pool.start().unwrap();

        for _ in 0..5 {
            pool.submit(Some(order()), TaskKind::ComputeTotal, None)
                .await
                .unwrap();
        }

        let results = pool.results();
        let out = drain(&results, 5).await;
        assert!(out.iter().all(|o| o.is_some()));
        pool.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn n_tasks_yield_n_results_across_worker_counts() {
        for workers in [1, 2, 4] {
            let pool = WorkerPool::new(workers, 32);
            pool.start().unwrap();

            for _ in 0..20 {
                pool.submit(Some(order()), TaskKind::Validate, None)
                    .await
                    .unwrap();
            }

            let results = pool.results();
            let out = drain(&results, 20).await;
            assert_eq!(out.len(), 20);
            pool.stop().await;
        }
    }

    #[tokio::test]
    async fn compute_total_result_matches_items() {
        let pool = WorkerPool::new(1, 4);
        pool.start().unwrap();

        pool.submit(Some(order()), TaskKind::ComputeTotal, None)
            .await
            .unwrap();

        let result = pool.results().recv().await.unwrap().unwrap();
        assert_eq!(result.total(), Money::from_cents(2000));
        assert_eq!(result.status(), OrderStatus::Pending);
        pool.stop().await;
    }

    #[tokio::test]
    async fn nil_order_task_yields_nil_result() {
        let pool = WorkerPool::new(1, 4);
        pool.start().unwrap();

        pool.submit(None, TaskKind::Finalize, None).await.unwrap();

        let result = pool.results().recv().await.unwrap();
        assert!(result.is_none());
        pool.stop().await;
    }

    #[tokio::test]
    async fn stop_drains_in_flight_tasks_and_closes_stream() {
        let pool = WorkerPool::new(2, 16);
        pool.start().unwrap();

        for _ in 0..8 {
            pool.submit(Some(order()), TaskKind::Finalize, None)
                .await
                .unwrap();
        }
        pool.stop().await;

        // Everything submitted before stop is delivered, then the stream
        // terminates.
        let results = pool.results();
        let mut seen = 0;
        while let Some(result) = results.recv().await {
            assert!(result.is_some());
            seen += 1;
        }
        assert_eq!(seen, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_on_a_full_stalled_queue_times_out() {
        // Never started: nothing drains the queue. The first submit fills
        // the only slot; the second must give up with an error instead of
        // blocking its caller indefinitely.
        let pool = WorkerPool::new(1, 1);
        pool.submit(Some(order()), TaskKind::Validate, None)
            .await
            .unwrap();

        let result = pool.submit(Some(order()), TaskKind::Validate, None).await;
        assert_eq!(result, Err(PoolError::SubmitTimeout));
    }

    #[tokio::test]
    async fn submit_after_stop_is_an_error() {
        let pool = WorkerPool::new(1, 4);
        pool.start().unwrap();
        pool.stop().await;

        let result = pool.submit(Some(order()), TaskKind::Validate, None).await;
        assert_eq!(result, Err(PoolError::Stopped));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let pool = WorkerPool::new(2, 4);
        pool.start().unwrap();
        pool.stop().await;
        pool.stop().await;
        assert!(pool.is_stopped());
    }

    #[tokio::test]
    async fn start_after_stop_is_a_noop() {
        let pool = WorkerPool::new(1, 4);
        pool.start().unwrap();
        pool.stop().await;

        pool.start().unwrap();
        assert!(pool.is_stopped());
        assert_eq!(
            pool.submit(Some(order()), TaskKind::Validate, None).await,
            Err(PoolError::Stopped)
        );
    }

    #[tokio::test]
    async fn introspection_is_safe_before_start() {
        let pool = WorkerPool::new(3, 4);
        assert!(!pool.is_stopped());
        assert_eq!(pool.worker_count(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn fifty_concurrent_writers_and_readers() {
        let pool = Arc::new(WorkerPool::new(2, 64));
        pool.start().unwrap();

        let mut writers = Vec::new();
        for _ in 0..50 {
            let pool = Arc::clone(&pool);
            writers.push(tokio::spawn(async move {
                pool.submit(Some(order()), TaskKind::Validate, None).await
            }));
        }

        let mut readers = Vec::new();
        for _ in 0..50 {
            let results = pool.results();
            readers.push(tokio::spawn(async move { results.recv().await }));
        }

        for w in writers {
            w.await.unwrap().unwrap();
        }
        let mut delivered = 0;
        for r in readers {
            let got = r.await.unwrap();
            let inner = got.expect("stream closed early");
            assert_eq!(inner.unwrap().status(), OrderStatus::Processing);
            delivered += 1;
        }
        assert_eq!(delivered, 50);
        pool.stop().await;
    }
}
