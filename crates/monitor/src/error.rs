//! Monitor and notification error types.

use thiserror::Error;

/// Errors surfaced by the event monitor's bounded-wait calls.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    /// The loop was not reading within the publish budget.
    #[error("Timed out publishing to the monitor")]
    PublishTimeout,

    /// No metrics snapshot arrived within the caller's budget.
    ///
    /// Expected in steady state: snapshots are produced on a slow periodic
    /// tick, so metrics reads are best-effort sampling.
    #[error("Timed out waiting for a metrics snapshot")]
    MetricsTimeout,

    /// The monitor's lifetime token is cancelled.
    #[error("Monitor is stopped")]
    Cancelled,
}

/// Errors surfaced by the notification worker group.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    /// An SMS worker failed to deliver; aborts the whole group.
    #[error("SMS delivery failed on worker {worker}")]
    SmsDelivery { worker: usize },

    /// No notification channel had capacity within the send budget.
    #[error("Timed out sending notification")]
    SendTimeout,

    /// A notification channel is closed.
    #[error("Notification channel closed")]
    ChannelClosed,

    /// A worker panicked; aborts the whole group.
    #[error("Notification worker panicked: {0}")]
    WorkerPanicked(String),
}
