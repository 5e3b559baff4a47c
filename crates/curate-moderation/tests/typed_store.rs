//! A host with its own typed table plugged in through `EntityStore`.

mod common;

use std::sync::Arc;

use curate_moderation::{EntityError, EntityRow, EntityStore, ModerationService, WriteOutcome};
use curate_types::{Actor, ModerationStatus, Snapshot, SubjectRef};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Value};

use common::{file_pool, registry};

struct PostsTable;

impl PostsTable {
    fn create(conn: &Connection) {
        conn.execute_batch(
            "CREATE TABLE posts (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                views INTEGER NOT NULL DEFAULT 0
            );",
        )
        .expect("should create posts table");
    }

    fn row_to_snapshot(title: String, views: i64) -> Snapshot {
        let mut fields = Snapshot::new();
        fields.insert("title".to_string(), json!(title));
        fields.insert("views".to_string(), json!(views));
        fields
    }
}

impl EntityStore for PostsTable {
    fn load(&self, conn: &Connection, subject: &SubjectRef) -> Result<Option<Snapshot>, EntityError> {
        let row = conn
            .query_row(
                "SELECT title, views FROM posts WHERE id = ?1",
                [&subject.object_pk],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        Ok(row.map(|(title, views)| Self::row_to_snapshot(title, views)))
    }

    fn save(&self, conn: &Connection, subject: &SubjectRef, fields: &Snapshot) -> Result<(), EntityError> {
        let title = fields
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| EntityError::Other("post needs a title".to_string()))?;
        let views = fields.get("views").and_then(Value::as_i64).unwrap_or(0);
        conn.execute(
            "INSERT INTO posts (id, title, views) VALUES (?1, ?2, ?3)
             ON CONFLICT (id) DO UPDATE SET title = excluded.title, views = excluded.views",
            params![subject.object_pk, title, views],
        )?;
        Ok(())
    }

    fn list(&self, conn: &Connection, _entity_type: &str) -> Result<Vec<EntityRow>, EntityError> {
        let mut stmt = conn.prepare("SELECT id, title, views FROM posts ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(EntityRow {
                object_pk: row.get::<_, i64>(0)?.to_string(),
                fields: Self::row_to_snapshot(row.get(1)?, row.get(2)?),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn delete(&self, conn: &Connection, subject: &SubjectRef) -> Result<bool, EntityError> {
        let deleted = conn.execute("DELETE FROM posts WHERE id = ?1", [&subject.object_pk])?;
        Ok(deleted > 0)
    }
}

fn fields(title: &str, views: i64) -> Snapshot {
    PostsTable::row_to_snapshot(title.to_string(), views)
}

fn service() -> (tempfile::TempDir, ModerationService) {
    let (dir, pool) = file_pool();
    PostsTable::create(&pool.get().expect("should get connection"));
    let mut registry = registry();
    let mut config = registry.unregister("post").expect("post is registered");
    config.ignored_fields = vec!["views".to_string()];
    registry.register("post", config).expect("re-register post");
    (dir, ModerationService::new(pool, registry, Arc::new(PostsTable)))
}

#[test]
fn test_typed_table_round_trip() {
    let (_dir, service) = service();
    let post = SubjectRef::new("post", "1");

    service.save_entity(&post, fields("Draft", 0), None).unwrap();
    assert_eq!(service.moderated_get(&post).unwrap(), None);
    service.approve(&post, "mod", None).unwrap();
    assert_eq!(service.moderated_get(&post).unwrap(), Some(fields("Draft", 0)));

    let outcome = service
        .save_entity(&post, fields("Final", 0), Some(&Actor::new("author")))
        .unwrap();
    assert!(matches!(outcome, WriteOutcome::HeldForReview { .. }));

    let conn = service.pool().get().unwrap();
    let live_title: String = conn
        .query_row("SELECT title FROM posts WHERE id = 1", [], |row| row.get(0))
        .unwrap();
    assert_eq!(live_title, "Draft");
    drop(conn);

    service.approve(&post, "mod", None).unwrap();
    assert_eq!(service.moderated_get(&post).unwrap(), Some(fields("Final", 0)));
}

#[test]
fn test_ignored_fields_write_through() {
    let (_dir, service) = service();
    let post = SubjectRef::new("post", "7");
    service
        .save_entity(&post, fields("Hello", 0), Some(&Actor::new("admin").staff()))
        .unwrap();

    let outcome = service.save_entity(&post, fields("Hello", 42), None).unwrap();
    assert!(matches!(outcome, WriteOutcome::Unchanged { .. }), "got {outcome:?}");
    assert_eq!(service.moderated_get(&post).unwrap(), Some(fields("Hello", 42)));

    let record = service.record(&post).unwrap().unwrap();
    assert_eq!(record.status, ModerationStatus::Approved);
    assert_eq!(record.version, 1);
}

#[test]
fn test_entity_store_failure_rolls_back() {
    let (_dir, service) = service();
    let post = SubjectRef::new("post", "3");

    let err = service.save_entity(&post, Snapshot::new(), None).unwrap_err();
    assert!(err.to_string().contains("post needs a title"), "got {err}");
    assert_eq!(service.record(&post).unwrap(), None);
    assert!(service.raw_list("post").unwrap().is_empty());
}

#[test]
fn test_rejected_draft_leaves_no_row() {
    let (_dir, service) = service();
    let post = SubjectRef::new("post", "9");
    service.save_entity(&post, fields("Spam", 0), None).unwrap();
    service.reject(&post, "mod", None).unwrap();

    let conn = service.pool().get().unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM posts WHERE id = 9", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
}
