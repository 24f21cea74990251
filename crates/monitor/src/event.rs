//! Transient order events consumed by the monitor loop.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

/// What happened to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Completed,
    Failed,
    NotificationSent,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Completed => "completed",
            EventKind::Failed => "failed",
            EventKind::NotificationSent => "notification_sent",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transient domain event. Events are consumed exactly once by the
/// monitor loop and are not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    /// Absent for system events that do not concern a specific order,
    /// such as notification deliveries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    pub user_id: UserId,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    /// Free-form context attached by the producer.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl OrderEvent {
    /// An event about a specific order.
    pub fn new(order_id: OrderId, user_id: UserId, kind: EventKind) -> Self {
        Self {
            order_id: Some(order_id),
            user_id,
            kind,
            timestamp: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    /// A system event with no associated order.
    pub fn system(user_id: UserId, kind: EventKind) -> Self {
        Self {
            order_id: None,
            user_id,
            kind,
            timestamp: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}
