//! The moderation state machine.
//!
//! ```text
//!            edit                 approve
//!   ┌──────────────────┐   ┌──────────────────► Approved ─┐
//!   │                  ▼   │                              │ edit
//! create ──────────► Pending                              │
//!   │                  ▲   │                              │
//!   │ auto-approve     │   └──────────────────► Rejected ─┤
//!   ▼                  │          reject                  │
//! Approved             └──────────────────────────────────┘
//! ```
//!
//! Decisions are only legal from `Pending`. Each decision runs in a single
//! `BEGIN IMMEDIATE` transaction that re-reads the record, checks the
//! precondition, rewrites live entity state, updates the record and queues
//! the author notification, so a decision either happens completely or not
//! at all.

use std::fmt;

use curate_notify::{enqueue, Notification};
use curate_types::{
    snapshots_equal, Actor, AutoApprovalRule, ModerationConfig, ModerationStatus,
    NotificationEvent, SubjectRef,
};
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::entity::EntityStore;
use crate::error::ModerationError;
use crate::registry::ModerationRegistry;
use crate::store::{get_record, update_record, ModerationRecord, RecordUpdate};

/// An explicit moderator decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// Status a pending record ends in after this decision.
    pub fn resulting_status(self) -> ModerationStatus {
        match self {
            Self::Approve => ModerationStatus::Approved,
            Self::Reject => ModerationStatus::Rejected,
        }
    }

    fn event(self) -> NotificationEvent {
        match self {
            Self::Approve => NotificationEvent::UserApproved,
            Self::Reject => NotificationEvent::UserRejected,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        })
    }
}

/// Why a write was held for review instead of auto-approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    /// The write carried no acting context.
    Anonymous,
    /// A deny rule matched (index into the rule list).
    Denied { rule: usize },
    /// No allow rule matched.
    NoMatch,
}

/// Outcome of auto-approval evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoDecision {
    /// An allow rule matched (index into the rule list) and no deny rule did.
    Approve { rule: usize },
    /// The write must wait for a moderator.
    Hold(HoldReason),
}

impl AutoDecision {
    /// Returns true for [`AutoDecision::Approve`].
    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approve { .. })
    }
}

/// Evaluates auto-approval rules against the acting context.
///
/// Deny rules are checked first across the whole list and win outright;
/// only then is the first matching allow rule taken. No match means the
/// write is held.
pub fn evaluate_rules(rules: &[AutoApprovalRule], actor: Option<&Actor>) -> AutoDecision {
    let Some(actor) = actor else {
        return AutoDecision::Hold(HoldReason::Anonymous);
    };

    if let Some(rule) = rules
        .iter()
        .position(|rule| rule.is_deny() && rule.matches(actor))
    {
        return AutoDecision::Hold(HoldReason::Denied { rule });
    }

    match rules
        .iter()
        .position(|rule| !rule.is_deny() && rule.matches(actor))
    {
        Some(rule) => AutoDecision::Approve { rule },
        None => AutoDecision::Hold(HoldReason::NoMatch),
    }
}

/// Approves the pending change of `subject`.
///
/// The approved values become the record's `current_snapshot` and are
/// written to live entity storage.
///
/// # Errors
///
/// - [`ModerationError::NotRegistered`] for an unregistered entity type.
/// - [`ModerationError::NotFound`] if no record exists.
/// - [`ModerationError::InvalidTransition`] if the record is not pending;
///   the record is left untouched.
pub fn approve(
    conn: &mut Connection,
    registry: &ModerationRegistry,
    entities: &dyn EntityStore,
    subject: &SubjectRef,
    moderator: &str,
    note: Option<&str>,
) -> Result<ModerationRecord, ModerationError> {
    decide(conn, registry, entities, subject, Decision::Approve, moderator, note)
}

/// Rejects the pending change of `subject`.
///
/// Live entity storage is left at (or restored to) the last approved
/// values. A never-approved instance is removed from live storage; its
/// record stays so a resubmission is moderated as an edit.
///
/// # Errors
///
/// Same as [`approve`].
pub fn reject(
    conn: &mut Connection,
    registry: &ModerationRegistry,
    entities: &dyn EntityStore,
    subject: &SubjectRef,
    moderator: &str,
    note: Option<&str>,
) -> Result<ModerationRecord, ModerationError> {
    decide(conn, registry, entities, subject, Decision::Reject, moderator, note)
}

fn decide(
    conn: &mut Connection,
    registry: &ModerationRegistry,
    entities: &dyn EntityStore,
    subject: &SubjectRef,
    decision: Decision,
    moderator: &str,
    note: Option<&str>,
) -> Result<ModerationRecord, ModerationError> {
    let config = registry.require(&subject.entity_type)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let record = get_record(&tx, subject)?;

    if record.status != ModerationStatus::Pending {
        tracing::debug!(
            subject = %subject,
            status = %record.status,
            action = %decision,
            "refusing decision on non-pending record"
        );
        return Err(ModerationError::InvalidTransition {
            subject: subject.clone(),
            status: record.status,
            action: decision,
        });
    }

    let pending = record
        .pending_snapshot
        .clone()
        .ok_or_else(|| ModerationError::StateError {
            subject: subject.clone(),
        })?;

    let live_target = match decision {
        Decision::Approve => Some(&pending),
        Decision::Reject => record.current_snapshot.as_ref(),
    };
    match live_target {
        Some(target) => {
            let live = entities.load(&tx, subject)?;
            let in_sync = live
                .as_ref()
                .is_some_and(|live| snapshots_equal(live, target, &config.ignored_fields));
            if !in_sync {
                entities.save(&tx, subject, target)?;
            }
        }
        // Rejected before ever being approved.
        None => {
            if entities.delete(&tx, subject)? {
                tracing::debug!(subject = %subject, "removed never-approved instance");
            }
        }
    }

    let mut update = RecordUpdate::from_record(&record);
    update.status = decision.resulting_status();
    update.pending_snapshot = None;
    update.moderated_by = Some(moderator.to_string());
    update.moderator_note = note.map(str::to_string);
    update.decided = true;
    if decision == Decision::Approve {
        update.current_snapshot = Some(pending);
    }

    let updated = update_record(&tx, &record, &update).map_err(|e| match e {
        ModerationError::Conflict(_) => ModerationError::InvalidTransition {
            subject: subject.clone(),
            status: record.status,
            action: decision,
        },
        other => other,
    })?;

    if config.notify_user {
        enqueue(&tx, &decision_notification(&updated, decision, &record))?;
    }

    tx.commit()?;

    tracing::info!(
        subject = %subject,
        moderator,
        status = %updated.status,
        "moderation decision recorded"
    );

    Ok(updated)
}

fn decision_notification(
    updated: &ModerationRecord,
    decision: Decision,
    before: &ModerationRecord,
) -> Notification {
    Notification {
        event: decision.event(),
        subject: updated.subject.clone(),
        status: updated.status,
        current_snapshot: updated.current_snapshot.clone(),
        // The decided change, so a rejection still tells the author what was refused.
        pending_snapshot: before.pending_snapshot.clone(),
        actor: updated.changed_by.clone(),
        moderator: updated.moderated_by.clone(),
        note: updated.moderator_note.clone(),
        recipients: Vec::new(),
    }
}

/// Builds the `moderator-pending` notification for a record that just
/// entered `Pending`.
pub(crate) fn pending_notification(
    record: &ModerationRecord,
    config: &ModerationConfig,
) -> Notification {
    Notification {
        event: NotificationEvent::ModeratorPending,
        subject: record.subject.clone(),
        status: record.status,
        current_snapshot: record.current_snapshot.clone(),
        pending_snapshot: record.pending_snapshot.clone(),
        actor: record.changed_by.clone(),
        moderator: None,
        note: None,
        recipients: config.moderator_recipients.clone(),
    }
}
