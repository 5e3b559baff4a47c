//! Moderated record store: one `moderation_records` row per tracked
//! instance.
//!
//! Records are never deleted here. Every mutation goes through
//! [`update_record`], which bumps `version` and refuses to write if the row
//! moved since it was read.

use curate_types::{ModerationStatus, Snapshot, SubjectRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::ModerationError;

/// The moderation state of one tracked instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationRecord {
    /// Internal database ID.
    pub id: i64,
    /// The tracked instance.
    pub subject: SubjectRef,
    /// Lifecycle state.
    pub status: ModerationStatus,
    /// Last approved values; `None` until the first approval.
    pub current_snapshot: Option<Snapshot>,
    /// Values awaiting review; `Some` exactly when `status` is `Pending`.
    pub pending_snapshot: Option<Snapshot>,
    /// Actor who authored the latest change.
    pub changed_by: Option<String>,
    /// Moderator of the latest decision.
    pub moderated_by: Option<String>,
    /// Free text attached to the latest decision.
    pub moderator_note: Option<String>,
    /// Incremented on every mutation.
    pub version: i64,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last mutation timestamp (ISO 8601).
    pub updated_at: String,
    /// Last explicit decision timestamp (ISO 8601).
    pub last_decision_at: Option<String>,
}

/// Values for a record that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub subject: SubjectRef,
    pub status: ModerationStatus,
    pub current_snapshot: Option<Snapshot>,
    pub pending_snapshot: Option<Snapshot>,
    pub changed_by: Option<String>,
}

/// A full replacement of a record's mutable state.
#[derive(Debug, Clone)]
pub struct RecordUpdate {
    pub status: ModerationStatus,
    pub current_snapshot: Option<Snapshot>,
    pub pending_snapshot: Option<Snapshot>,
    pub changed_by: Option<String>,
    pub moderated_by: Option<String>,
    pub moderator_note: Option<String>,
    /// Stamp `last_decision_at` with the current time.
    pub decided: bool,
}

impl RecordUpdate {
    /// Starts an update that keeps every field of `record` as it is.
    pub fn from_record(record: &ModerationRecord) -> Self {
        Self {
            status: record.status,
            current_snapshot: record.current_snapshot.clone(),
            pending_snapshot: record.pending_snapshot.clone(),
            changed_by: record.changed_by.clone(),
            moderated_by: record.moderated_by.clone(),
            moderator_note: record.moderator_note.clone(),
            decided: false,
        }
    }
}

const RECORD_COLUMNS: &str = "id, entity_type, object_pk, status, current_snapshot, \
     pending_snapshot, changed_by, moderated_by, moderator_note, version, \
     created_at, updated_at, last_decision_at";

/// Returns the record for `subject`, if one exists.
pub fn find_record(
    conn: &Connection,
    subject: &SubjectRef,
) -> Result<Option<ModerationRecord>, ModerationError> {
    let record = conn
        .query_row(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM moderation_records
                 WHERE entity_type = ?1 AND object_pk = ?2"
            ),
            params![subject.entity_type, subject.object_pk],
            map_row_to_record,
        )
        .optional()?;
    Ok(record)
}

/// Returns the record for `subject`.
///
/// # Errors
///
/// Returns [`ModerationError::NotFound`] if no record exists.
pub fn get_record(
    conn: &Connection,
    subject: &SubjectRef,
) -> Result<ModerationRecord, ModerationError> {
    find_record(conn, subject)?.ok_or_else(|| ModerationError::NotFound(subject.clone()))
}

/// Creates the record described by `new`, or resolves to the existing record
/// for the same subject.
///
/// The boolean is `true` when this call created the row.
pub fn get_or_create_record(
    conn: &Connection,
    new: &NewRecord,
) -> Result<(ModerationRecord, bool), ModerationError> {
    let current_json = to_json(new.current_snapshot.as_ref())?;
    let pending_json = to_json(new.pending_snapshot.as_ref())?;

    let inserted = conn.execute(
        "INSERT INTO moderation_records
            (entity_type, object_pk, status, current_snapshot, pending_snapshot, changed_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (entity_type, object_pk) DO NOTHING",
        params![
            new.subject.entity_type,
            new.subject.object_pk,
            new.status.as_str(),
            current_json,
            pending_json,
            new.changed_by,
        ],
    )?;

    let record = get_record(conn, &new.subject)?;
    Ok((record, inserted == 1))
}

/// Replaces the mutable state of `record`.
///
/// # Errors
///
/// Returns [`ModerationError::Conflict`] if the stored version no longer
/// matches `record.version`.
pub fn update_record(
    conn: &Connection,
    record: &ModerationRecord,
    update: &RecordUpdate,
) -> Result<ModerationRecord, ModerationError> {
    let current_json = to_json(update.current_snapshot.as_ref())?;
    let pending_json = to_json(update.pending_snapshot.as_ref())?;

    let updated = conn
        .query_row(
            &format!(
                "UPDATE moderation_records SET
                    status = ?1,
                    current_snapshot = ?2,
                    pending_snapshot = ?3,
                    changed_by = ?4,
                    moderated_by = ?5,
                    moderator_note = ?6,
                    last_decision_at = CASE WHEN ?7
                        THEN strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                        ELSE last_decision_at END,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                    version = version + 1
                 WHERE id = ?8 AND version = ?9
                 RETURNING {RECORD_COLUMNS}"
            ),
            params![
                update.status.as_str(),
                current_json,
                pending_json,
                update.changed_by,
                update.moderated_by,
                update.moderator_note,
                update.decided,
                record.id,
                record.version,
            ],
            map_row_to_record,
        )
        .optional()?;

    updated.ok_or_else(|| ModerationError::Conflict(record.subject.clone()))
}

/// Filter criteria for listing records.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Restrict to one entity type.
    pub entity_type: Option<String>,
    /// Restrict to one status.
    pub status: Option<ModerationStatus>,
    /// Maximum number of rows (no limit when `None`).
    pub limit: Option<i64>,
}

/// Lists records, oldest first.
pub fn list_records(
    conn: &Connection,
    filter: &RecordFilter,
) -> Result<Vec<ModerationRecord>, ModerationError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1u32;

    if let Some(ref entity_type) = filter.entity_type {
        clauses.push(format!("entity_type = ?{idx}"));
        param_values.push(Box::new(entity_type.clone()));
        idx += 1;
    }

    if let Some(status) = filter.status {
        clauses.push(format!("status = ?{idx}"));
        param_values.push(Box::new(status.as_str()));
        idx += 1;
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    // SQLite treats a negative LIMIT as "no limit".
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM moderation_records
         {where_clause}
         ORDER BY id ASC
         LIMIT ?{idx}"
    );
    param_values.push(Box::new(filter.limit.unwrap_or(-1)));

    let params_refs: Vec<&dyn rusqlite::types::ToSql> = param_values.iter().map(|p| &**p).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), map_row_to_record)?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// Number of records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

/// Counts records per status, optionally for one entity type.
pub fn count_by_status(
    conn: &Connection,
    entity_type: Option<&str>,
) -> Result<StatusCounts, ModerationError> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM moderation_records
         WHERE ?1 IS NULL OR entity_type = ?1
         GROUP BY status",
    )?;
    let rows = stmt.query_map([entity_type], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = StatusCounts::default();
    for row in rows {
        let (status, count) = row?;
        match status.parse::<ModerationStatus>() {
            Ok(ModerationStatus::Pending) => counts.pending = count,
            Ok(ModerationStatus::Approved) => counts.approved = count,
            Ok(ModerationStatus::Rejected) => counts.rejected = count,
            Err(e) => tracing::warn!(error = %e, "skipping unknown status in counts"),
        }
    }
    Ok(counts)
}

fn to_json(snapshot: Option<&Snapshot>) -> Result<Option<String>, serde_json::Error> {
    snapshot.map(serde_json::to_string).transpose()
}

fn snapshot_column(row: &Row, idx: usize) -> rusqlite::Result<Option<Snapshot>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })?)),
        None => Ok(None),
    }
}

fn map_row_to_record(row: &Row) -> rusqlite::Result<ModerationRecord> {
    let status_str: String = row.get(3)?;
    let status: ModerationStatus = status_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(ModerationRecord {
        id: row.get(0)?,
        subject: SubjectRef {
            entity_type: row.get(1)?,
            object_pk: row.get(2)?,
        },
        status,
        current_snapshot: snapshot_column(row, 4)?,
        pending_snapshot: snapshot_column(row, 5)?,
        changed_by: row.get(6)?,
        moderated_by: row.get(7)?,
        moderator_note: row.get(8)?,
        version: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        last_decision_at: row.get(12)?,
    })
}
