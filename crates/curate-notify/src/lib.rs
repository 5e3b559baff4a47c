//! Notification boundary for Curate.
//!
//! The moderation core never formats or sends messages. Instead every
//! status-affecting event becomes a [`Notification`] written to the
//! `notification_outbox` table in the same transaction as the change that
//! caused it. A delivery worker later drains the outbox, in sequence order,
//! into a host-supplied [`NotificationDispatcher`].
//!
//! # Event tags
//!
//! | Event | Audience | Raised when |
//! |-------|----------|-------------|
//! | `moderator-pending` | moderators | a change enters `Pending` |
//! | `user-approved` | author | a pending change is approved |
//! | `user-rejected` | author | a pending change is rejected |
//!
//! # Usage
//!
//! ```rust,ignore
//! use curate_notify::{deliver_all, TracingDispatcher};
//!
//! let report = deliver_all(&conn, &TracingDispatcher)?;
//! tracing::info!(delivered = report.delivered, "outbox drained");
//! ```

mod delivery;
mod error;
mod notification;
mod outbox;

pub use delivery::{
    deliver_all, deliver_queued, start_delivery_task, DeliveryReport, DEFAULT_BATCH_SIZE,
};
pub use error::{DispatchError, NotifyError};
pub use notification::{
    CollectingDispatcher, Notification, NotificationDispatcher, TracingDispatcher,
};
pub use outbox::{
    enqueue, mark_delivered, mark_failed, query_outbox, queued_entries, DeliveryState,
    OutboxEntry, OutboxFilter,
};
