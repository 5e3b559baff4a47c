//! Registration of entity types for moderation.

use std::collections::BTreeMap;

use curate_types::ModerationConfig;

use crate::error::ModerationError;

/// The set of entity types under moderation and their policies.
///
/// Built once during startup and shared by reference; there is no global
/// instance.
#[derive(Debug, Clone, Default)]
pub struct ModerationRegistry {
    entries: BTreeMap<String, ModerationConfig>,
}

impl ModerationRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from `(entity_type, config)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ModerationError::DuplicateRegistration`] if a type appears
    /// more than once.
    pub fn from_configs<I>(configs: I) -> Result<Self, ModerationError>
    where
        I: IntoIterator<Item = (String, ModerationConfig)>,
    {
        let mut registry = Self::new();
        for (entity_type, config) in configs {
            registry.register(entity_type, config)?;
        }
        Ok(registry)
    }

    /// Associates `entity_type` with a moderation policy.
    pub fn register(
        &mut self,
        entity_type: impl Into<String>,
        config: ModerationConfig,
    ) -> Result<(), ModerationError> {
        let entity_type = entity_type.into();
        if self.entries.contains_key(&entity_type) {
            return Err(ModerationError::DuplicateRegistration(entity_type));
        }
        tracing::debug!(
            entity_type = %entity_type,
            rules = config.rules.len(),
            "registered entity type for moderation"
        );
        self.entries.insert(entity_type, config);
        Ok(())
    }

    /// Removes the registration for `entity_type`, returning its policy.
    ///
    /// Existing moderation records are kept.
    pub fn unregister(&mut self, entity_type: &str) -> Result<ModerationConfig, ModerationError> {
        self.entries
            .remove(entity_type)
            .ok_or_else(|| ModerationError::NotRegistered(entity_type.to_string()))
    }

    pub fn get(&self, entity_type: &str) -> Option<&ModerationConfig> {
        self.entries.get(entity_type)
    }

    /// Like [`get`](Self::get), but unregistered types are an error.
    pub fn require(&self, entity_type: &str) -> Result<&ModerationConfig, ModerationError> {
        self.get(entity_type)
            .ok_or_else(|| ModerationError::NotRegistered(entity_type.to_string()))
    }

    pub fn is_registered(&self, entity_type: &str) -> bool {
        self.entries.contains_key(entity_type)
    }

    /// Registered entity types in sorted order.
    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
