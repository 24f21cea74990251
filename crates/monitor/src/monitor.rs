//! The event monitor: one coordination loop multiplexing every input
//! source, with bounded publish and bounded stop.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::MonitorError;
use crate::event::{EventKind, OrderEvent};

const EVENT_BUFFER: usize = 100;
const ALERT_BUFFER: usize = 10;
const METRICS_BUFFER: usize = 5;

/// Budget for handing an event or alert to the loop.
const PUBLISH_TIMEOUT: Duration = Duration::from_millis(100);
/// Budget for one spawned event-dispatch unit.
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(2);
/// How often the loop publishes a metrics snapshot.
const METRICS_INTERVAL: Duration = Duration::from_secs(30);
/// The loop raises an alert after this long without an event or alert.
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);
/// Ceiling on waiting for the loop to exit during stop.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Point-in-time counters published on the metrics tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Events buffered and not yet picked up by the loop.
    pub events_pending: usize,
    /// Alerts buffered and not yet picked up by the loop.
    pub alerts_pending: usize,
    /// Spawned event dispatches that have not finished.
    pub dispatches_in_flight: usize,
}

/// Receivers owned by the loop task, surrendered on the first `start`.
struct LoopChannels {
    event_rx: mpsc::Receiver<OrderEvent>,
    alert_rx: mpsc::Receiver<String>,
    metrics_tx: mpsc::Sender<MetricsSnapshot>,
    shutdown_rx: mpsc::Receiver<()>,
}

struct Inner {
    channels: Option<LoopChannels>,
    loop_handle: Option<JoinHandle<()>>,
}

/// Multiplexes order events, alerts, a periodic metrics tick, an
/// inactivity timeout, a shutdown signal, and a lifetime token in a
/// single loop. Event handling is fanned out to short-lived dispatch
/// tasks so a slow handler cannot stall the loop.
pub struct EventMonitor {
    event_tx: mpsc::Sender<OrderEvent>,
    alert_tx: mpsc::Sender<String>,
    shutdown_tx: mpsc::Sender<()>,
    metrics_rx: Arc<Mutex<mpsc::Receiver<MetricsSnapshot>>>,
    cancel: CancellationToken,
    dispatches: TaskTracker,
    inner: StdMutex<Inner>,
}

impl EventMonitor {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (alert_tx, alert_rx) = mpsc::channel(ALERT_BUFFER);
        let (metrics_tx, metrics_rx) = mpsc::channel(METRICS_BUFFER);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Self {
            event_tx,
            alert_tx,
            shutdown_tx,
            metrics_rx: Arc::new(Mutex::new(metrics_rx)),
            cancel: CancellationToken::new(),
            dispatches: TaskTracker::new(),
            inner: StdMutex::new(Inner {
                channels: Some(LoopChannels {
                    event_rx,
                    alert_rx,
                    metrics_tx,
                    shutdown_rx,
                }),
                loop_handle: None,
            }),
        }
    }

    /// Spawns the coordination loop. Starting twice is a logged no-op.
    pub fn start(&self) {
        let mut inner = self.inner.lock().unwrap();
        let Some(channels) = inner.channels.take() else {
            tracing::warn!("monitor already started");
            return;
        };

        let cancel = self.cancel.clone();
        let event_tx = self.event_tx.clone();
        let alert_tx = self.alert_tx.clone();
        let dispatches = self.dispatches.clone();
        inner.loop_handle = Some(tokio::spawn(run_loop(
            channels, event_tx, alert_tx, cancel, dispatches,
        )));
        tracing::info!("monitor started");
    }

    /// Hands an event to the loop, waiting at most the publish budget.
    pub async fn publish(&self, event: OrderEvent) -> Result<(), MonitorError> {
        if self.cancel.is_cancelled() {
            return Err(MonitorError::Cancelled);
        }
        tokio::select! {
            sent = tokio::time::timeout(PUBLISH_TIMEOUT, self.event_tx.send(event)) => {
                match sent {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err(MonitorError::Cancelled),
                    Err(_) => {
                        metrics::counter!("monitor_publish_timeouts").increment(1);
                        Err(MonitorError::PublishTimeout)
                    }
                }
            }
            () = self.cancel.cancelled() => Err(MonitorError::Cancelled),
        }
    }

    /// Hands an alert to the loop, waiting at most the publish budget.
    pub async fn raise_alert(&self, alert: impl Into<String>) -> Result<(), MonitorError> {
        if self.cancel.is_cancelled() {
            return Err(MonitorError::Cancelled);
        }
        tokio::select! {
            sent = tokio::time::timeout(PUBLISH_TIMEOUT, self.alert_tx.send(alert.into())) => {
                match sent {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err(MonitorError::Cancelled),
                    Err(_) => Err(MonitorError::PublishTimeout),
                }
            }
            () = self.cancel.cancelled() => Err(MonitorError::Cancelled),
        }
    }

    /// Waits up to `timeout` for the next metrics snapshot.
    ///
    /// Snapshots arrive on a slow tick and are dropped when nobody reads
    /// them, so [`MonitorError::MetricsTimeout`] is an expected outcome.
    pub async fn metrics(&self, timeout: Duration) -> Result<MetricsSnapshot, MonitorError> {
        tokio::select! {
            next = tokio::time::timeout(timeout, async {
                self.metrics_rx.lock().await.recv().await
            }) => {
                match next {
                    Ok(Some(snapshot)) => Ok(snapshot),
                    Ok(None) => Err(MonitorError::Cancelled),
                    Err(_) => Err(MonitorError::MetricsTimeout),
                }
            }
            () = self.cancel.cancelled() => Err(MonitorError::Cancelled),
        }
    }

    /// True once `stop` has begun.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stops the monitor with layered, bounded waits: cancel the lifetime
    /// token, nudge the loop over the shutdown channel within the publish
    /// budget, wait up to the stop ceiling for the loop to exit, then wait
    /// for in-flight dispatches (each already bounded by its own timeout).
    /// Idempotent.
    pub async fn stop(&self) {
        tracing::info!("stopping monitor");
        self.cancel.cancel();
        let _ = tokio::time::timeout(PUBLISH_TIMEOUT, self.shutdown_tx.send(())).await;

        let handle = self.inner.lock().unwrap().loop_handle.take();
        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                tracing::warn!("monitor loop did not exit within the stop ceiling");
            }
        }

        self.dispatches.close();
        self.dispatches.wait().await;
        tracing::info!("monitor stopped");
    }
}

impl Default for EventMonitor {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_loop(
    mut channels: LoopChannels,
    event_tx: mpsc::Sender<OrderEvent>,
    alert_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
    dispatches: TaskTracker,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + METRICS_INTERVAL, METRICS_INTERVAL);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            maybe_event = channels.event_rx.recv() => {
                // The monitor holds a sender, so the channel cannot close
                // while the loop runs.
                let Some(event) = maybe_event else { break };
                last_activity = Instant::now();
                dispatch(event, alert_tx.clone(), &dispatches);
            }
            maybe_alert = channels.alert_rx.recv() => {
                let Some(alert) = maybe_alert else { break };
                last_activity = Instant::now();
                metrics::counter!("monitor_alerts").increment(1);
                tracing::warn!(%alert, "alert received");
            }
            _ = ticker.tick() => {
                collect_metrics(&event_tx, &alert_tx, &channels.metrics_tx, &dispatches);
            }
            _ = channels.shutdown_rx.recv() => {
                tracing::info!("monitor shutdown signal received");
                break;
            }
            () = cancel.cancelled() => {
                tracing::info!("monitor lifetime cancelled");
                break;
            }
            () = tokio::time::sleep_until(last_activity + INACTIVITY_TIMEOUT) => {
                tracing::warn!("no monitor activity for {}s", INACTIVITY_TIMEOUT.as_secs());
                // Self-alert without blocking the loop on its own channel.
                if alert_tx.try_send("monitor inactive".to_owned()).is_err() {
                    tracing::debug!("alert channel full, inactivity alert dropped");
                }
                last_activity = Instant::now();
            }
        }
    }
}

/// Fans one event out to a bounded dispatch task so the loop keeps
/// draining its inputs.
fn dispatch(event: OrderEvent, alert_tx: mpsc::Sender<String>, dispatches: &TaskTracker) {
    dispatches.spawn(async move {
        if tokio::time::timeout(DISPATCH_TIMEOUT, handle_event(event, alert_tx))
            .await
            .is_err()
        {
            metrics::counter!("monitor_dispatch_timeouts").increment(1);
            tracing::warn!("event dispatch exceeded its budget, outcome dropped");
        }
    });
}

async fn handle_event(event: OrderEvent, alert_tx: mpsc::Sender<String>) {
    metrics::counter!("monitor_events", "kind" => event.kind.as_str()).increment(1);
    match event.kind {
        EventKind::Created | EventKind::Completed => {
            tracing::info!(order_id = ?event.order_id, kind = %event.kind, "order event");
        }
        EventKind::Failed => {
            tracing::error!(order_id = ?event.order_id, "order failed");
            let alert = match event.order_id {
                Some(id) => format!("order {id} failed"),
                None => "order failed".to_owned(),
            };
            if tokio::time::timeout(PUBLISH_TIMEOUT, alert_tx.send(alert))
                .await
                .is_err()
            {
                tracing::debug!("alert channel busy, failure alert dropped");
            }
        }
        EventKind::Updated | EventKind::NotificationSent => {
            tracing::debug!(order_id = ?event.order_id, kind = %event.kind, "order event");
        }
    }
}

/// Publishes a snapshot on the tick; a full metrics channel drops the
/// snapshot rather than blocking the loop.
fn collect_metrics(
    event_tx: &mpsc::Sender<OrderEvent>,
    alert_tx: &mpsc::Sender<String>,
    metrics_tx: &mpsc::Sender<MetricsSnapshot>,
    dispatches: &TaskTracker,
) {
    let snapshot = MetricsSnapshot {
        events_pending: event_tx.max_capacity() - event_tx.capacity(),
        alerts_pending: alert_tx.max_capacity() - alert_tx.capacity(),
        dispatches_in_flight: dispatches.len(),
    };
    match metrics_tx.try_send(snapshot) {
        Ok(()) => tracing::debug!(?snapshot, "metrics snapshot published"),
        Err(_) => {
            metrics::counter!("monitor_metrics_dropped").increment(1);
            tracing::debug!("metrics channel full, snapshot dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderId, UserId};

    fn created_event() -> OrderEvent {
        OrderEvent::new(OrderId::new(), UserId::new(), EventKind::Created)
    }

    #[tokio::test]
    async fn publish_and_stop() {
        let monitor = EventMonitor::new();
        monitor.start();

        for _ in 0..10 {
            monitor.publish(created_event()).await.unwrap();
        }
        monitor.raise_alert("totals drifting").await.unwrap();

        monitor.stop().await;
        assert!(monitor.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_publishes_all_land_and_stop_stays_bounded() {
        let monitor = EventMonitor::new();
        monitor.start();

        for _ in 0..10 {
            monitor.publish(created_event()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        // Each event is consumed by exactly one dispatch; stop waits for
        // them behind its ceilings and returns.
        monitor.stop().await;
        assert!(monitor.is_stopped());
    }

    #[tokio::test]
    async fn publish_after_stop_is_rejected() {
        let monitor = EventMonitor::new();
        monitor.start();
        monitor.stop().await;

        let result = monitor.publish(created_event()).await;
        assert_eq!(result, Err(MonitorError::Cancelled));
        let result = monitor.raise_alert("late").await;
        assert_eq!(result, Err(MonitorError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn publish_times_out_when_the_loop_never_reads() {
        // Never started: the buffer absorbs the first EVENT_BUFFER events,
        // then the publish budget kicks in.
        let monitor = EventMonitor::new();

        for _ in 0..EVENT_BUFFER {
            monitor.publish(created_event()).await.unwrap();
        }
        let result = monitor.publish(created_event()).await;
        assert_eq!(result, Err(MonitorError::PublishTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_time_out_before_the_first_tick() {
        let monitor = EventMonitor::new();
        monitor.start();

        let result = monitor.metrics(Duration::from_secs(5)).await;
        assert_eq!(result, Err(MonitorError::MetricsTimeout));

        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_arrive_on_the_tick() {
        let monitor = EventMonitor::new();
        monitor.start();

        // Waiting longer than the tick interval fast-forwards virtual time
        // through the first tick.
        let snapshot = monitor.metrics(Duration::from_secs(60)).await.unwrap();
        assert_eq!(snapshot.events_pending, 0);
        assert_eq!(snapshot.alerts_pending, 0);
        assert_eq!(snapshot.dispatches_in_flight, 0);

        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn loop_survives_the_inactivity_alert() {
        let monitor = EventMonitor::new();
        monitor.start();

        tokio::time::sleep(INACTIVITY_TIMEOUT + Duration::from_secs(30)).await;

        // The inactivity alert fired and was consumed; the loop is alive.
        monitor.publish(created_event()).await.unwrap();
        monitor.stop().await;
    }

    #[tokio::test]
    async fn stop_without_start_is_bounded() {
        let monitor = EventMonitor::new();
        monitor.stop().await;
        monitor.stop().await;
        assert!(monitor.is_stopped());
    }

    #[tokio::test]
    async fn start_after_stop_does_not_revive_the_loop() {
        let monitor = EventMonitor::new();
        monitor.start();
        monitor.stop().await;
        monitor.start();
        assert!(monitor.is_stopped());
    }
}
