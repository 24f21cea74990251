//! Supervised notification workers: fixed categories of workers over
//! per-category channels, failing together as one unit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use domain::Notification;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::NotifyError;
use crate::event::{EventKind, OrderEvent};
use crate::monitor::EventMonitor;

const EMAIL_BUFFER: usize = 50;
const SMS_BUFFER: usize = 20;
const PUSH_BUFFER: usize = 10;

const EMAIL_WORKERS: usize = 3;
const SMS_WORKERS: usize = 2;

/// Idle heartbeat for the push worker.
const PUSH_TICK: Duration = Duration::from_secs(1);
/// How often the metrics worker samples the monitor.
const METRICS_POLL: Duration = Duration::from_secs(10);
/// Budget for one metrics sample.
const METRICS_WAIT: Duration = Duration::from_secs(1);

type SharedRx = Arc<Mutex<mpsc::Receiver<Notification>>>;

/// A fixed group of notification workers: three email, two SMS, one
/// push, and one metrics sampler. The first worker error cancels the
/// whole group; [`NotificationGroup::run`] returns that first error
/// after every worker has exited.
#[derive(Clone)]
pub struct NotificationGroup {
    monitor: Arc<EventMonitor>,
    email_tx: mpsc::Sender<Notification>,
    sms_tx: mpsc::Sender<Notification>,
    push_tx: mpsc::Sender<Notification>,
    email_rx: SharedRx,
    sms_rx: SharedRx,
    push_rx: SharedRx,
    fail_next_sms: Arc<AtomicBool>,
}

impl NotificationGroup {
    pub fn new(monitor: Arc<EventMonitor>) -> Self {
        let (email_tx, email_rx) = mpsc::channel(EMAIL_BUFFER);
        let (sms_tx, sms_rx) = mpsc::channel(SMS_BUFFER);
        let (push_tx, push_rx) = mpsc::channel(PUSH_BUFFER);

        Self {
            monitor,
            email_tx,
            sms_tx,
            push_tx,
            email_rx: Arc::new(Mutex::new(email_rx)),
            sms_rx: Arc::new(Mutex::new(sms_rx)),
            push_rx: Arc::new(Mutex::new(push_rx)),
            fail_next_sms: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs every worker until the group is cancelled or one worker
    /// fails. On failure the remaining workers are cancelled, all are
    /// joined, and the first error is returned.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), NotifyError> {
        let group_cancel = cancel.child_token();
        let mut workers = JoinSet::new();

        for id in 1..=EMAIL_WORKERS {
            workers.spawn(email_worker(
                id,
                Arc::clone(&self.email_rx),
                Arc::clone(&self.monitor),
                group_cancel.clone(),
            ));
        }
        for id in 1..=SMS_WORKERS {
            workers.spawn(sms_worker(
                id,
                Arc::clone(&self.sms_rx),
                Arc::clone(&self.fail_next_sms),
                group_cancel.clone(),
            ));
        }
        workers.spawn(push_worker(Arc::clone(&self.push_rx), group_cancel.clone()));
        workers.spawn(metrics_worker(
            Arc::clone(&self.monitor),
            group_cancel.clone(),
        ));
        tracing::info!(
            workers = EMAIL_WORKERS + SMS_WORKERS + 2,
            "notification group running"
        );

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(err) => Err(NotifyError::WorkerPanicked(err.to_string())),
            };
            if let Err(err) = result {
                if first_error.is_none() {
                    tracing::error!(%err, "notification worker failed, cancelling group");
                    group_cancel.cancel();
                    first_error = Some(err);
                }
            }
        }

        tracing::info!("notification group stopped");
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Queues a notification on whichever channel has capacity, waiting
    /// at most `timeout` for a slot.
    pub async fn send(
        &self,
        notification: Notification,
        timeout: Duration,
    ) -> Result<(), NotifyError> {
        tokio::select! {
            permit = self.email_tx.reserve() => {
                permit.map_err(|_| NotifyError::ChannelClosed)?.send(notification);
                Ok(())
            }
            permit = self.sms_tx.reserve() => {
                permit.map_err(|_| NotifyError::ChannelClosed)?.send(notification);
                Ok(())
            }
            permit = self.push_tx.reserve() => {
                permit.map_err(|_| NotifyError::ChannelClosed)?.send(notification);
                Ok(())
            }
            () = tokio::time::sleep(timeout) => Err(NotifyError::SendTimeout),
        }
    }

    /// Queues a notification for the email workers, waiting for capacity.
    pub async fn send_email(&self, notification: Notification) -> Result<(), NotifyError> {
        self.email_tx
            .send(notification)
            .await
            .map_err(|_| NotifyError::ChannelClosed)
    }

    /// Queues a notification for the SMS workers, waiting for capacity.
    pub async fn send_sms(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sms_tx
            .send(notification)
            .await
            .map_err(|_| NotifyError::ChannelClosed)
    }

    /// Queues a notification for the push worker, waiting for capacity.
    pub async fn send_push(&self, notification: Notification) -> Result<(), NotifyError> {
        self.push_tx
            .send(notification)
            .await
            .map_err(|_| NotifyError::ChannelClosed)
    }

    /// Makes the next SMS delivery fail. Failure-injection hook for
    /// exercising the group's abort path.
    pub fn fail_next_sms(&self) {
        self.fail_next_sms.store(true, Ordering::SeqCst);
    }
}

async fn recv_shared(rx: &SharedRx) -> Option<Notification> {
    rx.lock().await.recv().await
}

async fn email_worker(
    id: usize,
    rx: SharedRx,
    monitor: Arc<EventMonitor>,
    cancel: CancellationToken,
) -> Result<(), NotifyError> {
    tracing::debug!(worker = id, "email worker started");
    loop {
        tokio::select! {
            maybe = recv_shared(&rx) => {
                let Some(notification) = maybe else { return Ok(()) };
                tracing::info!(
                    worker = id,
                    user_id = %notification.user_id,
                    email = ?notification.email,
                    "email sent",
                );
                metrics::counter!("notifications_sent", "channel" => "email").increment(1);

                let event = OrderEvent::system(notification.user_id, EventKind::NotificationSent)
                    .with_payload(serde_json::json!({ "channel": "email" }));
                if let Err(err) = monitor.publish(event).await {
                    tracing::debug!(worker = id, %err, "delivery event not published");
                }
            }
            () = cancel.cancelled() => {
                tracing::debug!(worker = id, "email worker stopping");
                return Ok(());
            }
        }
    }
}

async fn sms_worker(
    id: usize,
    rx: SharedRx,
    fail_next: Arc<AtomicBool>,
    cancel: CancellationToken,
) -> Result<(), NotifyError> {
    tracing::debug!(worker = id, "sms worker started");
    loop {
        tokio::select! {
            maybe = recv_shared(&rx) => {
                let Some(notification) = maybe else { return Ok(()) };
                if fail_next.swap(false, Ordering::SeqCst) {
                    return Err(NotifyError::SmsDelivery { worker: id });
                }
                tracing::info!(
                    worker = id,
                    user_id = %notification.user_id,
                    phone = ?notification.phone,
                    "sms sent",
                );
                metrics::counter!("notifications_sent", "channel" => "sms").increment(1);
            }
            () = cancel.cancelled() => {
                tracing::debug!(worker = id, "sms worker stopping");
                return Ok(());
            }
        }
    }
}

async fn push_worker(rx: SharedRx, cancel: CancellationToken) -> Result<(), NotifyError> {
    tracing::debug!("push worker started");
    let mut heartbeat = tokio::time::interval(PUSH_TICK);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            maybe = recv_shared(&rx) => {
                let Some(notification) = maybe else { return Ok(()) };
                tracing::info!(user_id = %notification.user_id, "push sent");
                metrics::counter!("notifications_sent", "channel" => "push").increment(1);
            }
            _ = heartbeat.tick() => {
                tracing::trace!("push worker idle");
            }
            () = cancel.cancelled() => {
                tracing::debug!("push worker stopping");
                return Ok(());
            }
        }
    }
}

/// Samples the monitor's metrics on a slow cadence. A missed sample is
/// routine; the worker only ever exits on cancellation.
async fn metrics_worker(
    monitor: Arc<EventMonitor>,
    cancel: CancellationToken,
) -> Result<(), NotifyError> {
    tracing::debug!("metrics worker started");
    let mut poll = tokio::time::interval(METRICS_POLL);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = poll.tick() => {
                let sample = tokio::select! {
                    sample = monitor.metrics(METRICS_WAIT) => Some(sample),
                    () = cancel.cancelled() => None,
                };
                match sample {
                    Some(Ok(snapshot)) => tracing::info!(?snapshot, "monitor metrics"),
                    Some(Err(err)) => tracing::debug!(%err, "metrics sample unavailable"),
                    None => return Ok(()),
                }
            }
            () = cancel.cancelled() => {
                tracing::debug!("metrics worker stopping");
                return Ok(());
            }
        }
    }
}
