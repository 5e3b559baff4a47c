//! Shared types for the Curate moderation workspace.
//!
//! This crate holds the vocabulary every other crate speaks: how a tracked
//! instance is addressed ([`SubjectRef`]), the moderation lifecycle states
//! ([`ModerationStatus`]), field snapshots ([`Snapshot`]), the acting
//! context of a write ([`Actor`]), notification event tags, and the
//! per-entity-type moderation policy ([`ModerationConfig`]).
//!
//! No crate in the workspace depends on anything *except* `curate-types` for
//! cross-cutting type definitions.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod policy;
mod snapshot;

pub use policy::{AutoApprovalRule, ModerationConfig};
pub use snapshot::{changed_fields, snapshots_equal, Snapshot};

/// Identifies one tracked entity instance: its registered type plus its
/// primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectRef {
    /// The registered entity type identifier (e.g. `"post"`).
    pub entity_type: String,
    /// The primary key of the instance, rendered as text.
    pub object_pk: String,
}

impl SubjectRef {
    /// Creates a subject reference.
    pub fn new(entity_type: impl Into<String>, object_pk: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            object_pk: object_pk.into(),
        }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_type, self.object_pk)
    }
}

/// Lifecycle state of a moderation record.
///
/// There is no "unset" state: every record is created as either `Pending`
/// or `Approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    /// A change is waiting for a moderator decision.
    Pending,
    /// The latest change was approved (explicitly or automatically).
    Approved,
    /// The latest change was rejected.
    Rejected,
}

impl ModerationStatus {
    /// Returns the canonical storage label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModerationStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown moderation status label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown moderation status: {0}")]
pub struct ParseStatusError(pub String);

/// Event tags carried by notifications handed to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationEvent {
    /// A change is waiting for review; addressed to moderators.
    ModeratorPending,
    /// The author's change was approved.
    UserApproved,
    /// The author's change was rejected.
    UserRejected,
}

impl NotificationEvent {
    /// Returns the canonical wire tag for this event.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModeratorPending => "moderator-pending",
            Self::UserApproved => "user-approved",
            Self::UserRejected => "user-rejected",
        }
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationEvent {
    type Err = ParseEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "moderator-pending" => Ok(Self::ModeratorPending),
            "user-approved" => Ok(Self::UserApproved),
            "user-rejected" => Ok(Self::UserRejected),
            _ => Err(ParseEventError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown notification event tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown notification event: {0}")]
pub struct ParseEventError(pub String);

/// The acting context of a write, evaluated against auto-approval rules.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identifier of the actor.
    pub id: String,
    /// Contact address used by user notifications, if known.
    #[serde(default)]
    pub email: Option<String>,
    /// Whether the actor holds elevated (staff) privilege.
    #[serde(default)]
    pub is_staff: bool,
    /// Groups the actor belongs to.
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl Actor {
    /// Creates a non-staff actor with no groups.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Marks the actor as staff.
    pub fn staff(mut self) -> Self {
        self.is_staff = true;
        self
    }

    /// Adds a group membership.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    /// Sets the contact address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Returns true if the actor belongs to `group`.
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }
}
