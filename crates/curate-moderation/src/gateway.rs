//! Moderated and raw read paths.
//!
//! Live storage already holds the last approved values of every instance
//! with an outstanding edit, because the interceptor restores the baseline
//! whenever it holds a change. The moderated path therefore only has to hide
//! instances that were never approved. The raw path is for moderator tooling
//! and shows the latest written values.

use std::collections::HashMap;

use curate_types::{Snapshot, SubjectRef};
use rusqlite::Connection;

use crate::entity::{EntityRow, EntityStore};
use crate::error::ModerationError;
use crate::registry::ModerationRegistry;
use crate::store::{find_record, list_records, ModerationRecord, RecordFilter};

/// Returns the approved values of `subject`, or `None` if it does not exist
/// or has never been approved.
pub fn moderated_get(
    conn: &Connection,
    registry: &ModerationRegistry,
    entities: &dyn EntityStore,
    subject: &SubjectRef,
) -> Result<Option<Snapshot>, ModerationError> {
    let live = entities.load(conn, subject)?;
    if live.is_none() || !registry.is_registered(&subject.entity_type) {
        return Ok(live);
    }

    let record = find_record(conn, subject)?;
    Ok(live.filter(|_| is_visible(record.as_ref())))
}

/// Lists the approved rows of `entity_type`, ordered by primary key.
pub fn moderated_list(
    conn: &Connection,
    registry: &ModerationRegistry,
    entities: &dyn EntityStore,
    entity_type: &str,
) -> Result<Vec<EntityRow>, ModerationError> {
    let rows = entities.list(conn, entity_type)?;
    if !registry.is_registered(entity_type) {
        return Ok(rows);
    }

    let records = records_by_pk(conn, entity_type)?;
    Ok(rows
        .into_iter()
        .filter(|row| is_visible(records.get(&row.object_pk)))
        .collect())
}

/// Returns the latest written values of `subject`, pending or not.
pub fn raw_get(
    conn: &Connection,
    entities: &dyn EntityStore,
    subject: &SubjectRef,
) -> Result<Option<Snapshot>, ModerationError> {
    if let Some(pending) = find_record(conn, subject)?.and_then(|r| r.pending_snapshot) {
        return Ok(Some(pending));
    }
    Ok(entities.load(conn, subject)?)
}

/// Lists the latest written values of every row of `entity_type`.
pub fn raw_list(
    conn: &Connection,
    entities: &dyn EntityStore,
    entity_type: &str,
) -> Result<Vec<EntityRow>, ModerationError> {
    let mut records = records_by_pk(conn, entity_type)?;
    let rows = entities
        .list(conn, entity_type)?
        .into_iter()
        .map(|row| {
            match records
                .remove(&row.object_pk)
                .and_then(|r| r.pending_snapshot)
            {
                Some(fields) => EntityRow {
                    object_pk: row.object_pk,
                    fields,
                },
                None => row,
            }
        })
        .collect();
    Ok(rows)
}

// Instances without a record predate moderation and stay visible.
fn is_visible(record: Option<&ModerationRecord>) -> bool {
    record.map_or(true, |r| r.current_snapshot.is_some())
}

fn records_by_pk(
    conn: &Connection,
    entity_type: &str,
) -> Result<HashMap<String, ModerationRecord>, ModerationError> {
    let records = list_records(
        conn,
        &RecordFilter {
            entity_type: Some(entity_type.to_string()),
            ..Default::default()
        },
    )?;
    Ok(records
        .into_iter()
        .map(|r| (r.subject.object_pk.clone(), r))
        .collect())
}
