//! Bounded worker pool for order tasks.
//!
//! This crate provides the task-execution side of the pipeline:
//! - [`OrderTask`] and [`TaskKind`] — typed units of work over an order
//! - [`WorkerPool`] — a fixed set of long-lived workers pulling tasks from
//!   a bounded queue and producing results onto a bounded stream
//! - [`ResultStream`] — a cloneable, receive-only handle on the results
//!
//! Tasks are unchecked primitives: they overwrite order state without
//! consulting the domain state machine. The checked transitions live on
//! the `Order` entity itself.

mod error;
mod pool;
mod task;

pub use error::PoolError;
pub use pool::{ResultStream, WorkerPool};
pub use task::{OrderTask, TaskKind};
