//! The persona registry for one simulation run.
//!
//! Built once from the validated configuration and owned by the driver;
//! there is no process-wide registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use scholar_core::AgentId;

use crate::config::{PersonaConfig, Role};
use crate::error::{Result, SimError};

/// Every persona in the run, keyed and iterated by agent id.
#[derive(Debug, Clone, Default)]
pub struct PersonaRegistry {
    personas: BTreeMap<AgentId, Arc<PersonaConfig>>,
}

impl PersonaRegistry {
    /// Register every persona.
    ///
    /// # Errors
    /// [`SimError::Config`] on a duplicate id.
    pub fn from_configs(personas: &[PersonaConfig]) -> Result<Self> {
        let mut registry = Self::default();
        for persona in personas {
            let id = AgentId::new(persona.id.clone());
            if registry.personas.insert(id, Arc::new(persona.clone())).is_some() {
                return Err(SimError::Config(format!("duplicate persona '{}'", persona.id)));
            }
        }
        Ok(registry)
    }

    /// Look up a persona.
    #[must_use]
    pub fn get(&self, id: &AgentId) -> Option<&Arc<PersonaConfig>> {
        self.personas.get(id)
    }

    /// Display name for `id`, falling back to the raw id.
    #[must_use]
    pub fn display_name<'a>(&'a self, id: &'a AgentId) -> &'a str {
        self.get(id).map_or(id.as_str(), |p| p.display_name())
    }

    /// All ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &AgentId> {
        self.personas.keys()
    }

    /// `(id, persona)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&AgentId, &Arc<PersonaConfig>)> {
        self.personas.iter()
    }

    /// The expert, if one is registered.
    #[must_use]
    pub fn expert(&self) -> Option<&AgentId> {
        self.personas
            .iter()
            .find(|(_, p)| p.role == Role::Expert)
            .map(|(id, _)| id)
    }

    /// Whether `id` is the expert.
    #[must_use]
    pub fn is_expert(&self, id: &AgentId) -> bool {
        self.get(id).is_some_and(|p| p.role == Role::Expert)
    }

    /// Number of personas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.personas.len()
    }

    /// Whether no personas are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TownConfig;

    #[test]
    fn default_registry_has_one_expert() {
        let registry = PersonaRegistry::from_configs(&TownConfig::default().personas).expect("registry");
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.expert().map(AgentId::as_str), Some("teacher"));
        assert_eq!(registry.display_name(&AgentId::from("student_2")), "Mei");
        assert_eq!(registry.display_name(&AgentId::from("ghost")), "ghost");
        let ids: Vec<_> = registry.ids().map(AgentId::as_str).collect();
        assert_eq!(ids, ["student_1", "student_2", "student_3", "student_4", "teacher"]);
    }

    #[test]
    fn duplicates_are_rejected() {
        let personas = TownConfig::default().personas;
        let doubled: Vec<_> = personas.iter().chain(personas.iter().take(1)).cloned().collect();
        assert!(PersonaRegistry::from_configs(&doubled).is_err());
    }
}
