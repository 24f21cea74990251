//! Event monitoring and notification workers for the order pipeline.
//!
//! This crate provides:
//! - [`EventMonitor`] — a single coordination loop multiplexing domain
//!   events, alerts, a periodic metrics tick, an inactivity timeout, a
//!   shutdown signal, and the monitor's own lifetime token
//! - [`OrderEvent`] / [`EventKind`] — transient domain events, consumed
//!   once by the loop
//! - [`NotificationGroup`] — supervised categories of background workers
//!   that fail together
//!
//! Every blocking wait in the public API is bounded by a timeout or a
//! cancellation token; a caller can never be stuck indefinitely.

mod error;
mod event;
mod monitor;
mod notify;

pub use error::{MonitorError, NotifyError};
pub use event::{EventKind, OrderEvent};
pub use monitor::{EventMonitor, MetricsSnapshot};
pub use notify::NotificationGroup;
