//! Notification value object consumed by the notification workers.

use common::UserId;
use serde::{Deserialize, Serialize};

/// A message to deliver to a user over one of the notification channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// The user the notification is addressed to.
    pub user_id: UserId,

    /// Destination email address, if any.
    pub email: Option<String>,

    /// Destination phone number, if any.
    pub phone: Option<String>,

    /// The message body.
    pub message: String,
}

impl Notification {
    /// Creates a notification with only a message body.
    pub fn new(user_id: UserId, message: impl Into<String>) -> Self {
        Self {
            user_id,
            email: None,
            phone: None,
            message: message.into(),
        }
    }

    /// Sets the destination email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the destination phone number.
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}
