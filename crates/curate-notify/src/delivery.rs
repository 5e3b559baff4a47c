//! Draining the outbox into a dispatcher.
//!
//! Exactly one delivery worker should run per database. Entries are handed
//! to the dispatcher strictly in sequence order, which is what guarantees a
//! `moderator-pending` notification reaches the dispatcher before the
//! decision notification for the same edit.

use std::sync::Arc;
use std::time::Duration;

use curate_db::DbPool;
use rusqlite::Connection;
use tokio::time::sleep;

use crate::error::NotifyError;
use crate::notification::NotificationDispatcher;
use crate::outbox::{mark_delivered, mark_failed, queued_entries};

/// Default number of entries taken per drain pass.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Counts from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Entries the dispatcher accepted.
    pub delivered: usize,
    /// Entries the dispatcher rejected.
    pub failed: usize,
}

impl DeliveryReport {
    /// Total entries processed.
    pub fn total(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Hands every queued entry (up to `batch_size`) to `dispatcher`.
///
/// Dispatcher failures are recorded on the row and do not stop the pass.
///
/// # Errors
///
/// Returns `NotifyError` only for outbox storage failures.
pub fn deliver_queued(
    conn: &Connection,
    dispatcher: &dyn NotificationDispatcher,
    batch_size: usize,
) -> Result<DeliveryReport, NotifyError> {
    let mut report = DeliveryReport::default();

    for entry in queued_entries(conn, batch_size)? {
        match dispatcher.dispatch(&entry.notification) {
            Ok(()) => {
                if mark_delivered(conn, entry.id)? {
                    report.delivered += 1;
                }
            }
            Err(e) => {
                tracing::warn!(
                    seq = entry.seq,
                    event = %entry.notification.event,
                    subject = %entry.notification.subject,
                    error = %e,
                    "notification delivery failed"
                );
                if mark_failed(conn, entry.id, &e.to_string())? {
                    report.failed += 1;
                }
            }
        }
    }

    Ok(report)
}

/// Drains the outbox until a pass comes back smaller than a full batch.
///
/// # Errors
///
/// Returns `NotifyError` for outbox storage failures.
pub fn deliver_all(
    conn: &Connection,
    dispatcher: &dyn NotificationDispatcher,
) -> Result<DeliveryReport, NotifyError> {
    let mut total = DeliveryReport::default();
    loop {
        let pass = deliver_queued(conn, dispatcher, DEFAULT_BATCH_SIZE)?;
        total.delivered += pass.delivered;
        total.failed += pass.failed;
        if pass.total() < DEFAULT_BATCH_SIZE {
            return Ok(total);
        }
    }
}

/// Starts a background task that periodically drains the outbox.
///
/// This task runs indefinitely; abort its handle to stop it.
///
/// # Arguments
///
/// * `pool` - Database connection pool.
/// * `dispatcher` - Where notifications are handed off.
/// * `interval` - Time to wait between drain passes.
pub async fn start_delivery_task(
    pool: DbPool,
    dispatcher: Arc<dyn NotificationDispatcher>,
    interval: Duration,
) {
    tracing::info!(
        interval_ms = interval.as_millis() as u64,
        "starting notification delivery task"
    );

    loop {
        sleep(interval).await;

        let pool = pool.clone();
        let dispatcher = dispatcher.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<DeliveryReport, NotifyError> {
            let conn = pool.get()?;
            deliver_all(&conn, dispatcher.as_ref())
        })
        .await;

        match result {
            Ok(Ok(report)) => {
                if report.total() > 0 {
                    tracing::info!(
                        delivered = report.delivered,
                        failed = report.failed,
                        "drained notification outbox"
                    );
                } else {
                    tracing::debug!("no queued notifications");
                }
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "failed to drain notification outbox");
            }
            Err(e) => {
                tracing::error!(error = %e, "delivery task panicked or was cancelled");
            }
        }
    }
}
