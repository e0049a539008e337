//! User-facing failure and notification messages.
//!
//! The orchestrator appends to these lists; the caller drains them after each
//! operation. Persistence error detail never lands here, only in the log.

use serde::{Deserialize, Serialize};

use crate::validate::Failure;

/// One message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub title: String,
    pub text: String,
}

impl Message {
    /// A message with a short title and the text shown to the user.
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }
}

impl From<Failure> for Message {
    fn from(failure: Failure) -> Self {
        Self {
            title: format!("{}.{}", failure.table, failure.field),
            text: failure.message,
        }
    }
}

/// Append-only failure and notification lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Messages {
    failures: Vec<Message>,
    notifications: Vec<Message>,
}

impl Messages {
    /// Empty lists.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records something that went wrong.
    pub fn add_failure(&mut self, message: Message) {
        self.failures.push(message);
    }

    /// Records something that succeeded.
    pub fn add_notification(&mut self, message: Message) {
        self.notifications.push(message);
    }

    /// Failures in the order they were added.
    pub fn failures(&self) -> &[Message] {
        &self.failures
    }

    /// Notifications in the order they were added.
    pub fn notifications(&self) -> &[Message] {
        &self.notifications
    }

    /// True if neither list holds a message.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty() && self.notifications.is_empty()
    }
}
