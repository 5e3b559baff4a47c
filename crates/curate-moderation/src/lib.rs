//! Moderation core for Curate.
//!
//! Writes to registered entity types pass through the [`Interceptor`],
//! which records each instance in the moderation record store, evaluates
//! auto-approval rules and holds unapproved edits back from live storage.
//! Moderators resolve held edits with [`approve`] or [`reject`]. Readers
//! pick the moderated or raw path from [`gateway`].
//!
//! Status changes queue notifications through `curate-notify` in the same
//! transaction that makes them, so a change and its notification commit or
//! roll back together.
//!
//! # Usage
//!
//! ```rust,ignore
//! use curate_moderation::{ModerationRegistry, ModerationService};
//! use curate_types::{ModerationConfig, SubjectRef};
//!
//! let mut registry = ModerationRegistry::new();
//! registry.register("post", ModerationConfig::default())?;
//! let service = ModerationService::with_sqlite_store(pool, registry);
//!
//! let post = SubjectRef::new("post", "1");
//! service.save_entity(&post, fields, None)?;
//! assert!(service.moderated_get(&post)?.is_none());
//! service.approve(&post, "mod-1", Some("looks good"))?;
//! ```

pub mod entity;
mod error;
pub mod gateway;
pub mod interceptor;
pub mod machine;
mod registry;
mod service;
pub mod store;

pub use entity::{EntityError, EntityRow, EntityStore, SqliteEntityStore};
pub use error::ModerationError;
pub use interceptor::{EntityWrite, Interceptor, WriteHandle, WriteOutcome};
pub use machine::{approve, evaluate_rules, reject, AutoDecision, Decision, HoldReason};
pub use registry::ModerationRegistry;
pub use service::ModerationService;
pub use store::{ModerationRecord, RecordFilter, StatusCounts};
