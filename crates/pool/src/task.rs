//! Order tasks and their execution semantics.

use domain::{Order, OrderStatus};
use serde::{Deserialize, Serialize};

/// The kind of work a task performs on its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Moves the order to `processing`.
    ///
    /// No content validation happens here; item validation is enforced at
    /// `Order` construction, so this pass only advances the status.
    Validate,

    /// Recomputes the order total from its line items. Status untouched.
    ComputeTotal,

    /// Marks the order `completed`, overwriting whatever status it had.
    Finalize,

    /// Applies the task's target status, if one was supplied.
    UpdateStatus,
}

impl TaskKind {
    /// Returns the kind name as a wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Validate => "validate",
            TaskKind::ComputeTotal => "compute_total",
            TaskKind::Finalize => "finalize",
            TaskKind::UpdateStatus => "update_status",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of work over an order.
///
/// Created by the orchestrator and exclusively owned by whichever worker
/// dequeues it; the order travels by value, never shared.
#[derive(Debug, Clone)]
pub struct OrderTask {
    /// The order to operate on. A task without an order produces a `None`
    /// result rather than an error.
    pub order: Option<Order>,

    /// What to do with the order.
    pub kind: TaskKind,

    /// Target status for [`TaskKind::UpdateStatus`] tasks.
    pub target_status: Option<OrderStatus>,
}

impl OrderTask {
    /// Creates a task over an order.
    pub fn new(order: Option<Order>, kind: TaskKind) -> Self {
        Self {
            order,
            kind,
            target_status: None,
        }
    }

    /// Creates an `UpdateStatus` task with a target status.
    pub fn update_status(order: Order, target: OrderStatus) -> Self {
        Self {
            order: Some(order),
            kind: TaskKind::UpdateStatus,
            target_status: Some(target),
        }
    }

    /// Executes the task, consuming it and returning the processed order.
    ///
    /// Returns `None` when the task carried no order — a valid, non-error
    /// outcome meaning "no order to report".
    pub(crate) fn execute(self, worker_id: usize) -> Option<Order> {
        let Some(mut order) = self.order else {
            tracing::warn!(worker = worker_id, kind = %self.kind, "task carried no order");
            return None;
        };

        tracing::debug!(worker = worker_id, order_id = %order.id(), kind = %self.kind, "processing task");

        match self.kind {
            TaskKind::Validate => order.force_status(OrderStatus::Processing),
            TaskKind::ComputeTotal => order.recompute_total(),
            TaskKind::Finalize => order.mark_completed(),
            TaskKind::UpdateStatus => {
                if let Some(status) = self.target_status {
                    order.force_status(status);
                }
            }
        }

        Some(order)
    }
}
