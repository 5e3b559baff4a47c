//! Per-entity-type moderation policy.

use serde::{Deserialize, Serialize};

use crate::Actor;

/// A predicate over the acting context that can short-circuit moderation.
///
/// Allow rules let a write skip the `Pending` state; deny rules force it.
/// Evaluation order is handled by the state machine: every deny rule is
/// checked before any allow rule, and a matching deny rule always wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AutoApprovalRule {
    /// Allow actors holding elevated privilege.
    Staff,
    /// Allow members of the named group.
    AllowGroup {
        /// Group name.
        group: String,
    },
    /// Allow one specific actor.
    AllowActor {
        /// Actor identifier.
        actor_id: String,
    },
    /// Force moderation for members of the named group.
    DenyGroup {
        /// Group name.
        group: String,
    },
}

impl AutoApprovalRule {
    /// Returns true for rules that force `Pending` when matched.
    pub fn is_deny(&self) -> bool {
        matches!(self, Self::DenyGroup { .. })
    }

    /// Returns true if the rule's predicate holds for `actor`.
    pub fn matches(&self, actor: &Actor) -> bool {
        match self {
            Self::Staff => actor.is_staff,
            Self::AllowGroup { group } | Self::DenyGroup { group } => actor.in_group(group),
            Self::AllowActor { actor_id } => actor.id == *actor_id,
        }
    }
}

/// Moderation options for one registered entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Ordered auto-approval rules.
    #[serde(default = "default_rules")]
    pub rules: Vec<AutoApprovalRule>,
    /// Whether moderators are told about pending changes.
    #[serde(default = "default_true")]
    pub notify_moderator: bool,
    /// Whether authors are told about decisions on their changes.
    #[serde(default = "default_true")]
    pub notify_user: bool,
    /// Addresses that receive `moderator-pending` notifications.
    #[serde(default)]
    pub moderator_recipients: Vec<String>,
    /// Fields excluded from change detection.
    #[serde(default)]
    pub ignored_fields: Vec<String>,
}

fn default_rules() -> Vec<AutoApprovalRule> {
    vec![AutoApprovalRule::Staff]
}

fn default_true() -> bool {
    true
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            notify_moderator: true,
            notify_user: true,
            moderator_recipients: Vec::new(),
            ignored_fields: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ModerationConfig::default();
        assert_eq!(config.rules, vec![AutoApprovalRule::Staff]);
        assert!(config.notify_moderator);
        assert!(config.notify_user);
        assert!(config.moderator_recipients.is_empty());
        assert!(config.ignored_fields.is_empty());
    }

    #[test]
    fn rules_deserialize_from_tagged_json() {
        let json = r#"[
            {"kind": "deny_group", "group": "probation"},
            {"kind": "staff"},
            {"kind": "allow_group", "group": "editors"},
            {"kind": "allow_actor", "actor_id": "bot-1"}
        ]"#;
        let rules: Vec<AutoApprovalRule> = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(rules.len(), 4);
        assert!(rules[0].is_deny());
        assert!(!rules[1].is_deny());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ModerationConfig =
            serde_json::from_str(r#"{"notify_user": false}"#).expect("should deserialize");
        assert_eq!(config.rules, vec![AutoApprovalRule::Staff]);
        assert!(config.notify_moderator);
        assert!(!config.notify_user);
    }

    #[test]
    fn rule_predicates() {
        let actor = Actor::new("bot-1").with_group("editors");
        assert!(!AutoApprovalRule::Staff.matches(&actor));
        assert!(AutoApprovalRule::AllowGroup {
            group: "editors".into()
        }
        .matches(&actor));
        assert!(AutoApprovalRule::AllowActor {
            actor_id: "bot-1".into()
        }
        .matches(&actor));
        assert!(!AutoApprovalRule::DenyGroup {
            group: "probation".into()
        }
        .matches(&actor));
    }
}
