#![allow(dead_code)]

use curate_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use curate_moderation::{ModerationRegistry, ModerationService};
use curate_notify::{query_outbox, OutboxFilter};
use curate_types::{AutoApprovalRule, ModerationConfig, NotificationEvent, Snapshot};
use serde_json::json;
use tempfile::TempDir;

/// Creates a migrated file-backed pool. The directory must outlive the pool.
pub fn file_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("curate.db");
    let pool = create_pool(
        path.to_str().expect("utf-8 path"),
        DbRuntimeSettings::default(),
    )
    .expect("pool should build");
    run_migrations(&pool.get().expect("should get connection")).expect("migrations should succeed");
    (dir, pool)
}

/// `post` holds everyone but staff; `wiki` trusts editors except those on
/// probation.
pub fn registry() -> ModerationRegistry {
    let mut registry = ModerationRegistry::new();
    registry
        .register(
            "post",
            ModerationConfig {
                moderator_recipients: vec!["mods@example.com".to_string()],
                ..ModerationConfig::default()
            },
        )
        .expect("register post");
    registry
        .register(
            "wiki",
            ModerationConfig {
                rules: vec![
                    AutoApprovalRule::AllowGroup {
                        group: "editors".to_string(),
                    },
                    AutoApprovalRule::DenyGroup {
                        group: "probation".to_string(),
                    },
                ],
                ..ModerationConfig::default()
            },
        )
        .expect("register wiki");
    registry
}

pub fn service() -> (TempDir, ModerationService) {
    let (dir, pool) = file_pool();
    (dir, ModerationService::with_sqlite_store(pool, registry()))
}

pub fn post(title: &str, body: &str) -> Snapshot {
    let mut fields = Snapshot::new();
    fields.insert("title".to_string(), json!(title));
    fields.insert("body".to_string(), json!(body));
    fields
}

/// Every queued or delivered notification for `object_pk`, in sequence
/// order.
pub fn events_for(pool: &DbPool, object_pk: &str) -> Vec<NotificationEvent> {
    let conn = pool.get().expect("should get connection");
    query_outbox(
        &conn,
        &OutboxFilter {
            object_pk: Some(object_pk.to_string()),
            ..Default::default()
        },
    )
    .expect("outbox query should succeed")
    .into_iter()
    .map(|entry| entry.notification.event)
    .collect()
}
