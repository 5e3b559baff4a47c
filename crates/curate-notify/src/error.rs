//! Error types for the notification outbox.

/// Errors that can occur while queueing or draining notifications.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// A database operation failed.
    #[error("notify database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("notify serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No pooled connection could be obtained.
    #[error("notify pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

/// A delivery failure reported by a [`NotificationDispatcher`].
///
/// Delivery failures are recorded on the outbox row and never roll back the
/// moderation decision that produced the notification.
///
/// [`NotificationDispatcher`]: crate::NotificationDispatcher
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct DispatchError(pub String);
