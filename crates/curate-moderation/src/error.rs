//! Error types for the moderation core.

use curate_notify::NotifyError;
use curate_types::{ModerationStatus, SubjectRef};

use crate::entity::EntityError;
use crate::machine::Decision;

/// Errors returned by moderation operations.
///
/// Every variant is reported synchronously to the caller that violated a
/// precondition; nothing is retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    /// `after_write` ran for an update without a baseline from
    /// `before_write`.
    ///
    /// The entity write itself may already sit in the caller's transaction;
    /// the caller must roll it back rather than commit an unmoderated change.
    #[error("no pre-write baseline captured for {subject}; before_write must run first")]
    StateError {
        /// The instance being written.
        subject: SubjectRef,
    },

    /// A decision was requested for a record that is not pending.
    #[error("cannot {action} {subject}: record is {status}, not pending")]
    InvalidTransition {
        /// The instance the decision was about.
        subject: SubjectRef,
        /// The status the record was found in.
        status: ModerationStatus,
        /// The decision that was refused.
        action: Decision,
    },

    /// The entity type already has a moderation registration.
    #[error("entity type '{0}' is already registered for moderation")]
    DuplicateRegistration(String),

    /// The entity type has no moderation registration.
    #[error("entity type '{0}' is not registered for moderation")]
    NotRegistered(String),

    /// No moderation record exists for the instance.
    #[error("no moderation record for {0}")]
    NotFound(SubjectRef),

    /// The record's version moved between read and write.
    #[error("moderation record for {0} was modified concurrently")]
    Conflict(SubjectRef),

    /// A database operation failed.
    #[error("moderation database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No pooled connection became available.
    #[error("moderation connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Snapshot serialization or deserialization failed.
    #[error("moderation serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The entity store failed.
    #[error(transparent)]
    Entity(#[from] EntityError),

    /// Queueing a notification failed.
    #[error(transparent)]
    Notify(#[from] NotifyError),
}
