//! Persistence operations for the notification outbox.
//!
//! Notifications are written through [`enqueue`] on the same connection (and
//! therefore inside the same transaction) as the moderation change that
//! produced them. A rolled-back change leaves no notification behind, and
//! the sequence number assigned at insert time fixes delivery order.

use std::fmt;
use std::str::FromStr;

use curate_types::NotificationEvent;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;
use crate::notification::Notification;

/// Delivery state of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    /// Waiting for the delivery worker.
    Queued,
    /// Handed to the dispatcher successfully.
    Delivered,
    /// The dispatcher reported a failure.
    Failed,
}

impl DeliveryState {
    /// Returns the storage label for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown delivery state: {other}")),
        }
    }
}

/// A single row from the `notification_outbox` table.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    /// Auto-incremented row ID.
    pub id: i64,
    /// Monotonically increasing delivery order.
    pub seq: i64,
    /// Current delivery state.
    pub state: DeliveryState,
    /// Number of delivery attempts made.
    pub attempts: i64,
    /// Error reported by the last failed attempt.
    pub last_error: Option<String>,
    /// When the row was written.
    pub enqueued_at: String,
    /// When the row left the `queued` state.
    pub processed_at: Option<String>,
    /// The notification itself.
    pub notification: Notification,
}

const ENTRY_COLUMNS: &str =
    "id, seq, state, attempts, last_error, enqueued_at, processed_at, payload_json";

/// Writes a notification to the outbox.
///
/// The sequence number is computed inside the INSERT itself, so concurrent
/// writers can never observe the same `MAX(seq)`.
///
/// # Errors
///
/// Returns `NotifyError::Database` on SQL failure or
/// `NotifyError::Serialization` if the payload cannot be serialised.
pub fn enqueue(conn: &Connection, notification: &Notification) -> Result<OutboxEntry, NotifyError> {
    let payload_json = serde_json::to_string(notification)?;

    let (id, seq, enqueued_at) = conn.query_row(
        "INSERT INTO notification_outbox
            (seq, event, entity_type, object_pk, payload_json)
         VALUES (
            (SELECT COALESCE(MAX(seq), 0) + 1 FROM notification_outbox),
            ?1, ?2, ?3, ?4
         )
         RETURNING id, seq, enqueued_at",
        params![
            notification.event.as_str(),
            notification.subject.entity_type,
            notification.subject.object_pk,
            payload_json,
        ],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?)),
    )?;

    tracing::debug!(
        seq,
        event = %notification.event,
        subject = %notification.subject,
        "queued notification"
    );

    Ok(OutboxEntry {
        id,
        seq,
        state: DeliveryState::Queued,
        attempts: 0,
        last_error: None,
        enqueued_at,
        processed_at: None,
        notification: notification.clone(),
    })
}

/// Returns up to `limit` queued entries, oldest sequence first.
///
/// # Errors
///
/// Returns `NotifyError::Database` on SQL failure.
pub fn queued_entries(conn: &Connection, limit: usize) -> Result<Vec<OutboxEntry>, NotifyError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM notification_outbox
         WHERE state = 'queued'
         ORDER BY seq ASC
         LIMIT ?1"
    ))?;
    let rows = stmt.query_map([limit as i64], map_row_to_entry)?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

/// Marks a queued entry as delivered.
///
/// Returns `false` if the entry was no longer queued.
///
/// # Errors
///
/// Returns `NotifyError::Database` on SQL failure.
pub fn mark_delivered(conn: &Connection, id: i64) -> Result<bool, NotifyError> {
    let count = conn.execute(
        "UPDATE notification_outbox
         SET state = 'delivered',
             attempts = attempts + 1,
             processed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1 AND state = 'queued'",
        [id],
    )?;
    Ok(count == 1)
}

/// Marks a queued entry as failed, recording the dispatcher's error.
///
/// Returns `false` if the entry was no longer queued.
///
/// # Errors
///
/// Returns `NotifyError::Database` on SQL failure.
pub fn mark_failed(conn: &Connection, id: i64, error: &str) -> Result<bool, NotifyError> {
    let count = conn.execute(
        "UPDATE notification_outbox
         SET state = 'failed',
             attempts = attempts + 1,
             last_error = ?2,
             processed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1 AND state = 'queued'",
        params![id, error],
    )?;
    Ok(count == 1)
}

/// Filter criteria for querying the outbox.
#[derive(Debug, Clone, Default)]
pub struct OutboxFilter {
    /// Filter by entity type.
    pub entity_type: Option<String>,
    /// Filter by primary key.
    pub object_pk: Option<String>,
    /// Filter by event tag.
    pub event: Option<NotificationEvent>,
    /// Filter by delivery state.
    pub state: Option<DeliveryState>,
    /// Maximum number of rows to return (default: 100).
    pub limit: Option<i64>,
}

/// Queries the outbox with optional filters, in sequence order.
///
/// # Errors
///
/// Returns `NotifyError::Database` on SQL failure.
pub fn query_outbox(
    conn: &Connection,
    filter: &OutboxFilter,
) -> Result<Vec<OutboxEntry>, NotifyError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1u32;

    if let Some(ref entity_type) = filter.entity_type {
        clauses.push(format!("entity_type = ?{idx}"));
        param_values.push(Box::new(entity_type.clone()));
        idx += 1;
    }

    if let Some(ref object_pk) = filter.object_pk {
        clauses.push(format!("object_pk = ?{idx}"));
        param_values.push(Box::new(object_pk.clone()));
        idx += 1;
    }

    if let Some(event) = filter.event {
        clauses.push(format!("event = ?{idx}"));
        param_values.push(Box::new(event.as_str()));
        idx += 1;
    }

    if let Some(state) = filter.state {
        clauses.push(format!("state = ?{idx}"));
        param_values.push(Box::new(state.as_str()));
        idx += 1;
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM notification_outbox
         {where_clause}
         ORDER BY seq ASC
         LIMIT ?{idx}"
    );
    param_values.push(Box::new(filter.limit.unwrap_or(100)));

    let params_refs: Vec<&dyn rusqlite::types::ToSql> = param_values.iter().map(|p| &**p).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), map_row_to_entry)?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

fn map_row_to_entry(row: &Row) -> rusqlite::Result<OutboxEntry> {
    let state_str: String = row.get(2)?;
    let state: DeliveryState = state_str.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;

    let payload_json: String = row.get(7)?;
    let notification: Notification = serde_json::from_str(&payload_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(OutboxEntry {
        id: row.get(0)?,
        seq: row.get(1)?,
        state,
        attempts: row.get(3)?,
        last_error: row.get(4)?,
        enqueued_at: row.get(5)?,
        processed_at: row.get(6)?,
        notification,
    })
}
