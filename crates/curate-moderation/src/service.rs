//! Pool-backed facade over the interceptor, state machine and gateway.

use std::sync::Arc;

use curate_db::DbPool;
use curate_types::{Actor, Snapshot, SubjectRef};
use rusqlite::TransactionBehavior;

use crate::entity::{EntityRow, EntityStore, SqliteEntityStore};
use crate::error::ModerationError;
use crate::gateway;
use crate::interceptor::{EntityWrite, Interceptor, WriteOutcome};
use crate::machine;
use crate::registry::ModerationRegistry;
use crate::store::{self, ModerationRecord, RecordFilter, StatusCounts};

/// Moderation entry point for hosts that keep entity state in the same
/// SQLite database as the moderation tables.
///
/// Cheap to share behind an `Arc`; every call checks a connection out of
/// the pool for its own transaction.
pub struct ModerationService {
    pool: DbPool,
    registry: Arc<ModerationRegistry>,
    entities: Arc<dyn EntityStore>,
    interceptor: Interceptor,
}

impl ModerationService {
    pub fn new(
        pool: DbPool,
        registry: ModerationRegistry,
        entities: Arc<dyn EntityStore>,
    ) -> Self {
        let registry = Arc::new(registry);
        let interceptor = Interceptor::new(Arc::clone(&registry), Arc::clone(&entities));
        Self {
            pool,
            registry,
            entities,
            interceptor,
        }
    }

    /// Creates a service over the bundled `tracked_entities` table.
    pub fn with_sqlite_store(pool: DbPool, registry: ModerationRegistry) -> Self {
        Self::new(pool, registry, Arc::new(SqliteEntityStore))
    }

    pub fn registry(&self) -> &ModerationRegistry {
        &self.registry
    }

    /// The hooks, for hosts that drive their own entity writes.
    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Writes `fields` to `subject` through the interceptor.
    ///
    /// The hook pair, the entity write, the record update and any queued
    /// notification share one `BEGIN IMMEDIATE` transaction. On error
    /// nothing is committed, including the entity write.
    pub fn save_entity(
        &self,
        subject: &SubjectRef,
        fields: Snapshot,
        actor: Option<&Actor>,
    ) -> Result<WriteOutcome, ModerationError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let result = (|| -> Result<WriteOutcome, ModerationError> {
            let handle = self.interceptor.before_write(&tx, subject)?;
            self.entities.save(&tx, subject, &fields)?;
            let write = EntityWrite {
                subject: subject.clone(),
                fields,
            };
            self.interceptor
                .after_write(&tx, &write, !handle.persisted, actor)
        })();

        match result {
            Ok(outcome) => {
                tx.commit()?;
                Ok(outcome)
            }
            Err(e) => {
                self.interceptor.discard(subject);
                tracing::warn!(subject = %subject, error = %e, "entity write rolled back");
                Err(e)
            }
        }
    }

    pub fn approve(
        &self,
        subject: &SubjectRef,
        moderator: &str,
        note: Option<&str>,
    ) -> Result<ModerationRecord, ModerationError> {
        let mut conn = self.pool.get()?;
        machine::approve(
            &mut conn,
            &self.registry,
            self.entities.as_ref(),
            subject,
            moderator,
            note,
        )
    }

    pub fn reject(
        &self,
        subject: &SubjectRef,
        moderator: &str,
        note: Option<&str>,
    ) -> Result<ModerationRecord, ModerationError> {
        let mut conn = self.pool.get()?;
        machine::reject(
            &mut conn,
            &self.registry,
            self.entities.as_ref(),
            subject,
            moderator,
            note,
        )
    }

    pub fn moderated_get(&self, subject: &SubjectRef) -> Result<Option<Snapshot>, ModerationError> {
        let conn = self.pool.get()?;
        gateway::moderated_get(&conn, &self.registry, self.entities.as_ref(), subject)
    }

    pub fn moderated_list(&self, entity_type: &str) -> Result<Vec<EntityRow>, ModerationError> {
        let conn = self.pool.get()?;
        gateway::moderated_list(&conn, &self.registry, self.entities.as_ref(), entity_type)
    }

    pub fn raw_get(&self, subject: &SubjectRef) -> Result<Option<Snapshot>, ModerationError> {
        let conn = self.pool.get()?;
        gateway::raw_get(&conn, self.entities.as_ref(), subject)
    }

    pub fn raw_list(&self, entity_type: &str) -> Result<Vec<EntityRow>, ModerationError> {
        let conn = self.pool.get()?;
        gateway::raw_list(&conn, self.entities.as_ref(), entity_type)
    }

    /// The moderation record of `subject`, if it is tracked.
    pub fn record(&self, subject: &SubjectRef) -> Result<Option<ModerationRecord>, ModerationError> {
        let conn = self.pool.get()?;
        store::find_record(&conn, subject)
    }

    pub fn records(&self, filter: &RecordFilter) -> Result<Vec<ModerationRecord>, ModerationError> {
        let conn = self.pool.get()?;
        store::list_records(&conn, filter)
    }

    pub fn counts(&self, entity_type: Option<&str>) -> Result<StatusCounts, ModerationError> {
        let conn = self.pool.get()?;
        store::count_by_status(&conn, entity_type)
    }
}
