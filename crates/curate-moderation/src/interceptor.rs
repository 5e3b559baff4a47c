//! Change interception around entity writes.
//!
//! The host calls [`Interceptor::before_write`] before persisting a tracked
//! instance and [`Interceptor::after_write`] right after, both on the same
//! connection and inside the same transaction as the entity write. The
//! baseline captured by the first call lets the second one put the
//! last-approved values back into live storage when an edit is held for
//! review, so default readers keep seeing approved data.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use curate_notify::enqueue;
use curate_types::{
    changed_fields, snapshots_equal, Actor, ModerationConfig, ModerationStatus, Snapshot,
    SubjectRef,
};
use rusqlite::Connection;

use crate::entity::EntityStore;
use crate::error::ModerationError;
use crate::machine::{evaluate_rules, pending_notification, AutoDecision};
use crate::registry::ModerationRegistry;
use crate::store::{
    find_record, get_or_create_record, update_record, ModerationRecord, NewRecord, RecordUpdate,
};

/// The values an entity write just persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityWrite {
    pub subject: SubjectRef,
    pub fields: Snapshot,
}

/// What [`Interceptor::before_write`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteHandle {
    pub subject: SubjectRef,
    /// The entity type is registered for moderation.
    pub tracked: bool,
    /// A persisted row existed and its values were captured as the baseline.
    pub persisted: bool,
    /// The captured baseline equals the record's outstanding pending values.
    pub baseline_matches_pending: bool,
}

/// What [`Interceptor::after_write`] did with a write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The entity type is not under moderation.
    Untracked,
    /// A first write created the moderation record.
    Created {
        record: ModerationRecord,
        decision: AutoDecision,
    },
    /// No moderation-relevant field changed.
    Unchanged { record: ModerationRecord },
    /// The write repeated the outstanding pending values; live storage was
    /// restored and the record left alone.
    AlreadyPending { record: ModerationRecord },
    /// The write restored the approved values, dropping the outstanding
    /// pending edit.
    Withdrawn { record: ModerationRecord },
    /// The author passed auto-approval; the write stays live.
    AutoApproved {
        record: ModerationRecord,
        rule: usize,
    },
    /// The edit is pending review and live storage holds the baseline again.
    HeldForReview {
        record: ModerationRecord,
        changed_fields: Vec<String>,
    },
}

impl WriteOutcome {
    /// The moderation record after the write, if the type is tracked.
    pub fn record(&self) -> Option<&ModerationRecord> {
        match self {
            Self::Untracked => None,
            Self::Created { record, .. }
            | Self::Unchanged { record }
            | Self::AlreadyPending { record }
            | Self::Withdrawn { record }
            | Self::AutoApproved { record, .. }
            | Self::HeldForReview { record, .. } => Some(record),
        }
    }
}

/// Before/after-write hooks with a shared baseline buffer.
pub struct Interceptor {
    registry: Arc<ModerationRegistry>,
    entities: Arc<dyn EntityStore>,
    baselines: Mutex<HashMap<SubjectRef, Snapshot>>,
}

impl Interceptor {
    pub fn new(registry: Arc<ModerationRegistry>, entities: Arc<dyn EntityStore>) -> Self {
        Self {
            registry,
            entities,
            baselines: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ModerationRegistry {
        &self.registry
    }

    /// Captures the persisted values of `subject` before a write lands.
    ///
    /// Nothing is captured for unregistered types or instances that are not
    /// persisted yet.
    pub fn before_write(
        &self,
        conn: &Connection,
        subject: &SubjectRef,
    ) -> Result<WriteHandle, ModerationError> {
        let mut handle = WriteHandle {
            subject: subject.clone(),
            tracked: false,
            persisted: false,
            baseline_matches_pending: false,
        };

        let Some(config) = self.registry.get(&subject.entity_type) else {
            return Ok(handle);
        };
        handle.tracked = true;

        let Some(baseline) = self.entities.load(conn, subject)? else {
            return Ok(handle);
        };
        handle.persisted = true;

        if let Some(pending) = find_record(conn, subject)?.and_then(|r| r.pending_snapshot) {
            handle.baseline_matches_pending =
                snapshots_equal(&baseline, &pending, &config.ignored_fields);
        }

        self.lock_baselines().insert(subject.clone(), baseline);
        Ok(handle)
    }

    /// Moderates a write that just landed.
    ///
    /// # Errors
    ///
    /// Returns [`ModerationError::StateError`] for an update with no baseline
    /// captured by [`before_write`](Self::before_write). The entity write is
    /// still in the caller's transaction at that point and must be rolled
    /// back.
    pub fn after_write(
        &self,
        conn: &Connection,
        write: &EntityWrite,
        was_create: bool,
        actor: Option<&Actor>,
    ) -> Result<WriteOutcome, ModerationError> {
        let subject = &write.subject;
        let baseline = self.lock_baselines().remove(subject);

        let Some(config) = self.registry.get(&subject.entity_type) else {
            return Ok(WriteOutcome::Untracked);
        };

        let existing = find_record(conn, subject)?;

        if was_create {
            return match existing {
                None => self.create(conn, config, write, actor),
                // A primary key reused after the original row went away.
                Some(record) => {
                    let baseline = baseline.or_else(|| record.current_snapshot.clone());
                    self.change(conn, config, write, Some(record), baseline, actor)
                }
            };
        }

        let Some(baseline) = baseline else {
            tracing::error!(subject = %subject, "update intercepted without a baseline");
            return Err(ModerationError::StateError {
                subject: subject.clone(),
            });
        };
        self.change(conn, config, write, existing, Some(baseline), actor)
    }

    /// Drops a captured baseline without moderating, for writes that were
    /// abandoned between the two hooks.
    pub fn discard(&self, subject: &SubjectRef) {
        self.lock_baselines().remove(subject);
    }

    fn create(
        &self,
        conn: &Connection,
        config: &ModerationConfig,
        write: &EntityWrite,
        actor: Option<&Actor>,
    ) -> Result<WriteOutcome, ModerationError> {
        let decision = evaluate_rules(&config.rules, actor);
        let new = if decision.is_approved() {
            NewRecord {
                subject: write.subject.clone(),
                status: ModerationStatus::Approved,
                current_snapshot: Some(write.fields.clone()),
                pending_snapshot: None,
                changed_by: actor.map(|a| a.id.clone()),
            }
        } else {
            NewRecord {
                subject: write.subject.clone(),
                status: ModerationStatus::Pending,
                current_snapshot: None,
                pending_snapshot: Some(write.fields.clone()),
                changed_by: actor.map(|a| a.id.clone()),
            }
        };

        let (record, _) = get_or_create_record(conn, &new)?;
        if record.status == ModerationStatus::Pending && config.notify_moderator {
            enqueue(conn, &pending_notification(&record, config))?;
        }

        tracing::info!(
            subject = %record.subject,
            status = %record.status,
            "moderation record created"
        );
        Ok(WriteOutcome::Created { record, decision })
    }

    fn change(
        &self,
        conn: &Connection,
        config: &ModerationConfig,
        write: &EntityWrite,
        record: Option<ModerationRecord>,
        baseline: Option<Snapshot>,
        actor: Option<&Actor>,
    ) -> Result<WriteOutcome, ModerationError> {
        let subject = &write.subject;
        let ignored = &config.ignored_fields;
        let empty = Snapshot::new();
        let mut changed =
            changed_fields(baseline.as_ref().unwrap_or(&empty), &write.fields, ignored);
        let outstanding = record.as_ref().and_then(|r| r.pending_snapshot.as_ref());
        let supersedes_pending =
            outstanding.is_some_and(|pending| !snapshots_equal(pending, &write.fields, ignored));

        if changed.is_empty() && !supersedes_pending {
            let record = match record {
                Some(record) => record,
                None => adopt(conn, subject, baseline, actor)?,
            };
            tracing::debug!(subject = %subject, "write changed no moderated fields");
            return Ok(WriteOutcome::Unchanged { record });
        }

        // The author wrote the live values back while an edit was pending.
        if changed.is_empty() {
            if let Some(record) = record.as_ref().filter(|r| r.current_snapshot.is_some()) {
                let mut update = RecordUpdate::from_record(record);
                update.status = ModerationStatus::Approved;
                update.pending_snapshot = None;
                update.changed_by = actor.map(|a| a.id.clone());
                let record = update_record(conn, record, &update)?;
                tracing::info!(subject = %subject, "pending edit withdrawn");
                return Ok(WriteOutcome::Withdrawn { record });
            }
            // Never approved: the written values replace the pending draft.
            if let Some(pending) = outstanding {
                changed = changed_fields(pending, &write.fields, ignored);
            }
        }

        if let Some(record) = &record {
            let repeats_pending = record
                .pending_snapshot
                .as_ref()
                .is_some_and(|pending| snapshots_equal(pending, &write.fields, ignored));
            if repeats_pending {
                if let Some(baseline) = &baseline {
                    self.entities.save(conn, subject, baseline)?;
                }
                tracing::debug!(subject = %subject, "write repeats outstanding pending edit");
                return Ok(WriteOutcome::AlreadyPending {
                    record: record.clone(),
                });
            }
        }

        let changed_by = actor.map(|a| a.id.clone());
        match evaluate_rules(&config.rules, actor) {
            AutoDecision::Approve { rule } => {
                let record = match record {
                    Some(record) => {
                        let mut update = RecordUpdate::from_record(&record);
                        update.status = ModerationStatus::Approved;
                        update.current_snapshot = Some(write.fields.clone());
                        update.pending_snapshot = None;
                        update.changed_by = changed_by;
                        update_record(conn, &record, &update)?
                    }
                    None => {
                        let new = NewRecord {
                            subject: subject.clone(),
                            status: ModerationStatus::Approved,
                            current_snapshot: Some(write.fields.clone()),
                            pending_snapshot: None,
                            changed_by,
                        };
                        get_or_create_record(conn, &new)?.0
                    }
                };
                tracing::info!(subject = %subject, rule, "edit auto-approved");
                Ok(WriteOutcome::AutoApproved { record, rule })
            }
            AutoDecision::Hold(reason) => {
                if let Some(baseline) = &baseline {
                    self.entities.save(conn, subject, baseline)?;
                }
                let record = match record {
                    Some(record) => {
                        let mut update = RecordUpdate::from_record(&record);
                        update.status = ModerationStatus::Pending;
                        update.pending_snapshot = Some(write.fields.clone());
                        update.changed_by = changed_by;
                        update_record(conn, &record, &update)?
                    }
                    None => {
                        let new = NewRecord {
                            subject: subject.clone(),
                            status: ModerationStatus::Pending,
                            current_snapshot: baseline,
                            pending_snapshot: Some(write.fields.clone()),
                            changed_by,
                        };
                        get_or_create_record(conn, &new)?.0
                    }
                };
                if config.notify_moderator {
                    enqueue(conn, &pending_notification(&record, config))?;
                }
                tracing::info!(
                    subject = %subject,
                    reason = ?reason,
                    fields = ?changed,
                    "edit held for review"
                );
                Ok(WriteOutcome::HeldForReview {
                    record,
                    changed_fields: changed,
                })
            }
        }
    }

    fn lock_baselines(&self) -> MutexGuard<'_, HashMap<SubjectRef, Snapshot>> {
        self.baselines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Starts tracking an instance persisted before its type was registered;
/// its existing values count as approved.
fn adopt(
    conn: &Connection,
    subject: &SubjectRef,
    baseline: Option<Snapshot>,
    actor: Option<&Actor>,
) -> Result<ModerationRecord, ModerationError> {
    let new = NewRecord {
        subject: subject.clone(),
        status: ModerationStatus::Approved,
        current_snapshot: baseline,
        pending_snapshot: None,
        changed_by: actor.map(|a| a.id.clone()),
    };
    let (record, _) = get_or_create_record(conn, &new)?;
    tracing::debug!(subject = %subject, "adopted pre-existing instance");
    Ok(record)
}
