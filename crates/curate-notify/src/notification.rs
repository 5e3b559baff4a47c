//! Notification payloads and the dispatcher boundary.

use std::sync::Mutex;

use curate_types::{ModerationStatus, NotificationEvent, Snapshot, SubjectRef};
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Structured data handed to the dispatcher on a status-affecting event.
///
/// The core never formats or delivers messages; templates, mail transport
/// and address resolution all belong to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Which event happened.
    pub event: NotificationEvent,
    /// The tracked instance the event is about.
    pub subject: SubjectRef,
    /// Record status after the event.
    pub status: ModerationStatus,
    /// Last approved values, if any.
    pub current_snapshot: Option<Snapshot>,
    /// Values awaiting review, if any.
    pub pending_snapshot: Option<Snapshot>,
    /// Author of the change, when known.
    pub actor: Option<String>,
    /// Moderator who made the decision (decision events only).
    #[serde(default)]
    pub moderator: Option<String>,
    /// Moderator note attached to the decision.
    #[serde(default)]
    pub note: Option<String>,
    /// Addresses the dispatcher should deliver to.
    #[serde(default)]
    pub recipients: Vec<String>,
}

/// Callback the moderation core uses to hand off notifications.
///
/// Implementations are called from the delivery worker, one notification at
/// a time, in outbox sequence order.
pub trait NotificationDispatcher: Send + Sync {
    /// Delivers a single notification.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if delivery failed. The failure is recorded
    /// and the notification is not retried.
    fn dispatch(&self, notification: &Notification) -> Result<(), DispatchError>;
}

/// Dispatcher that writes each notification to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDispatcher;

impl NotificationDispatcher for TracingDispatcher {
    fn dispatch(&self, notification: &Notification) -> Result<(), DispatchError> {
        tracing::info!(
            event = %notification.event,
            subject = %notification.subject,
            status = %notification.status,
            actor = notification.actor.as_deref().unwrap_or("<anonymous>"),
            recipients = notification.recipients.len(),
            "moderation notification"
        );
        Ok(())
    }
}

/// Dispatcher that keeps every notification in memory.
///
/// Useful for embedding hosts that forward notifications themselves and for
/// tests that assert on what would have been sent.
#[derive(Debug, Default)]
pub struct CollectingDispatcher {
    received: Mutex<Vec<Notification>>,
}

impl CollectingDispatcher {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Removes and returns everything received so far.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(
            &mut *self
                .received
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

impl NotificationDispatcher for CollectingDispatcher {
    fn dispatch(&self, notification: &Notification) -> Result<(), DispatchError> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification.clone());
        Ok(())
    }
}
