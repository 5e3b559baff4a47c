//! The seam between the moderation core and the host's persistence layer.
//!
//! The core never owns entity tables. It reads and writes live entity state
//! through [`EntityStore`], always on the connection (and therefore inside
//! the transaction) the host hands it. [`SqliteEntityStore`] is a generic
//! JSON-backed implementation over the `tracked_entities` table for hosts
//! that have no typed tables of their own.

use curate_types::{Snapshot, SubjectRef};
use rusqlite::{params, Connection, OptionalExtension};

/// Errors raised by an [`EntityStore`].
#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    /// A database operation failed.
    #[error("entity store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Field values could not be converted.
    #[error("entity store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A host-specific failure.
    #[error("entity store error: {0}")]
    Other(String),
}

/// One live entity row.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    /// Primary key rendered as text.
    pub object_pk: String,
    /// Field values.
    pub fields: Snapshot,
}

/// CRUD-by-primary-key access to live entity state, with field
/// introspection expressed as [`Snapshot`]s.
pub trait EntityStore: Send + Sync {
    /// Loads the persisted field values of one instance.
    fn load(&self, conn: &Connection, subject: &SubjectRef) -> Result<Option<Snapshot>, EntityError>;

    /// Inserts or overwrites the persisted field values of one instance.
    fn save(&self, conn: &Connection, subject: &SubjectRef, fields: &Snapshot)
        -> Result<(), EntityError>;

    /// Lists every persisted instance of `entity_type`, ordered by primary key.
    fn list(&self, conn: &Connection, entity_type: &str) -> Result<Vec<EntityRow>, EntityError>;

    /// Removes one instance. Returns `false` if it was not persisted.
    fn delete(&self, conn: &Connection, subject: &SubjectRef) -> Result<bool, EntityError>;
}

/// [`EntityStore`] over the generic `tracked_entities` table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteEntityStore;

impl EntityStore for SqliteEntityStore {
    fn load(&self, conn: &Connection, subject: &SubjectRef) -> Result<Option<Snapshot>, EntityError> {
        let fields_json: Option<String> = conn
            .query_row(
                "SELECT fields_json FROM tracked_entities
                 WHERE entity_type = ?1 AND object_pk = ?2",
                params![subject.entity_type, subject.object_pk],
                |row| row.get(0),
            )
            .optional()?;

        match fields_json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save(
        &self,
        conn: &Connection,
        subject: &SubjectRef,
        fields: &Snapshot,
    ) -> Result<(), EntityError> {
        let fields_json = serde_json::to_string(fields)?;
        conn.execute(
            "INSERT INTO tracked_entities (entity_type, object_pk, fields_json)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (entity_type, object_pk) DO UPDATE SET
                fields_json = excluded.fields_json,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![subject.entity_type, subject.object_pk, fields_json],
        )?;
        Ok(())
    }

    fn list(&self, conn: &Connection, entity_type: &str) -> Result<Vec<EntityRow>, EntityError> {
        let mut stmt = conn.prepare(
            "SELECT object_pk, fields_json FROM tracked_entities
             WHERE entity_type = ?1 ORDER BY object_pk ASC",
        )?;
        let rows = stmt.query_map([entity_type], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut entities = Vec::new();
        for row in rows {
            let (object_pk, fields_json) = row?;
            entities.push(EntityRow {
                object_pk,
                fields: serde_json::from_str(&fields_json)?,
            });
        }
        Ok(entities)
    }

    fn delete(&self, conn: &Connection, subject: &SubjectRef) -> Result<bool, EntityError> {
        let deleted = conn.execute(
            "DELETE FROM tracked_entities WHERE entity_type = ?1 AND object_pk = ?2",
            params![subject.entity_type, subject.object_pk],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().expect("failed to open in-memory db");
        curate_db::run_migrations(&conn).expect("failed to run migrations");
        conn
    }

    fn fields(title: &str) -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.insert("title".to_string(), json!(title));
        snapshot
    }

    #[test]
    fn test_entity_crud() {
        let conn = setup_db();
        let store = SqliteEntityStore;
        let subject = SubjectRef::new("post", "1");

        assert_eq!(store.load(&conn, &subject).expect("load failed"), None);

        store.save(&conn, &subject, &fields("first")).expect("insert failed");
        assert_eq!(
            store.load(&conn, &subject).expect("load failed"),
            Some(fields("first"))
        );

        store.save(&conn, &subject, &fields("second")).expect("update failed");
        assert_eq!(
            store.load(&conn, &subject).expect("load failed"),
            Some(fields("second"))
        );

        assert!(store.delete(&conn, &subject).expect("delete failed"));
        assert_eq!(store.load(&conn, &subject).expect("load failed"), None);
        assert!(!store.delete(&conn, &subject).expect("delete failed"));
    }

    #[test]
    fn test_list_is_scoped_and_ordered() {
        let conn = setup_db();
        let store = SqliteEntityStore;
        store.save(&conn, &SubjectRef::new("post", "b"), &fields("b")).unwrap();
        store.save(&conn, &SubjectRef::new("post", "a"), &fields("a")).unwrap();
        store.save(&conn, &SubjectRef::new("comment", "c"), &fields("c")).unwrap();

        let posts = store.list(&conn, "post").expect("list failed");
        let pks: Vec<&str> = posts.iter().map(|row| row.object_pk.as_str()).collect();
        assert_eq!(pks, vec!["a", "b"]);
        assert_eq!(posts[0].fields, fields("a"));
    }
}
