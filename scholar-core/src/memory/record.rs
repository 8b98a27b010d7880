//! Memory records: one remembered event from an agent's perspective.

use serde::{Deserialize, Serialize};

use crate::config::MemoryConfig;
use crate::error::{CoreError, Result};
use crate::types::{AgentId, LocationKey, MemoryId, MemoryType, SimTime, Tier, Timestamp};
use crate::world::LocationMap;

/// What a producer hands to [`MemoryStore::remember`](super::MemoryStore::remember).
///
/// The store fills in id, actor, timestamp and tier; importance falls back
/// to the configured default.
#[derive(Debug, Clone)]
pub struct MemoryDraft {
    /// Text description of the event.
    pub content: String,
    /// Where it happened. Must be a key of the world's location map.
    pub location: LocationKey,
    /// Open tag used for search filtering.
    pub memory_type: MemoryType,
    /// Explicit importance; `None` uses the configured default.
    pub importance: Option<f32>,
    /// Other agents involved.
    pub related_agents: Vec<AgentId>,
}

impl MemoryDraft {
    /// Start a draft with default importance and no related agents.
    #[must_use]
    pub fn new(
        content: impl Into<String>,
        location: impl Into<LocationKey>,
        memory_type: impl Into<MemoryType>,
    ) -> Self {
        Self {
            content: content.into(),
            location: location.into(),
            memory_type: memory_type.into(),
            importance: None,
            related_agents: Vec::new(),
        }
    }

    /// Set an explicit importance.
    #[must_use]
    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }

    /// Set the other agents involved.
    #[must_use]
    pub fn with_related(mut self, agents: impl IntoIterator<Item = AgentId>) -> Self {
        self.related_agents = agents.into_iter().collect();
        self
    }
}

/// A single stored memory.
///
/// Everything except `importance`, `access_count` and `tier` is fixed at
/// creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique within the owning store, assigned in creation order.
    pub id: MemoryId,
    /// Natural language description of the event.
    pub content: String,
    /// The agent who experienced it.
    pub actor: AgentId,
    /// Other agents involved, sorted and de-duplicated.
    pub related_agents: Vec<AgentId>,
    /// Where it happened.
    pub location: LocationKey,
    /// Search tag.
    pub memory_type: MemoryType,
    /// When it happened.
    pub timestamp: Timestamp,
    /// Ranking weight, inside the configured bounds.
    pub importance: f32,
    /// How many times retrieval has returned this record.
    pub access_count: u32,
    /// Current storage tier.
    pub tier: Tier,
}

impl MemoryRecord {
    /// Validate a draft and turn it into a short-term record.
    ///
    /// # Errors
    /// - [`CoreError::InvalidLocation`] if the draft's location is not in `locations`.
    /// - [`CoreError::InvalidImportance`] if the importance is outside the bounds.
    pub fn new(
        id: MemoryId,
        actor: AgentId,
        draft: MemoryDraft,
        at: SimTime,
        locations: &LocationMap,
        config: &MemoryConfig,
    ) -> Result<Self> {
        if !locations.contains(draft.location.as_str()) {
            return Err(CoreError::InvalidLocation(draft.location));
        }
        let importance = draft.importance.unwrap_or(config.default_importance);
        if !config.importance_in_bounds(importance) {
            return Err(CoreError::InvalidImportance {
                value: importance,
                min: config.importance_min,
                max: config.importance_max,
            });
        }

        let mut related_agents = draft.related_agents;
        related_agents.retain(|agent| *agent != actor);
        related_agents.sort();
        related_agents.dedup();

        Ok(Self {
            id,
            content: draft.content,
            actor,
            related_agents,
            location: draft.location,
            memory_type: draft.memory_type,
            timestamp: Timestamp::now(at),
            importance,
            access_count: 0,
            tier: Tier::ShortTerm,
        })
    }

    /// Record one retrieval.
    pub fn record_access(&mut self) {
        self.access_count = self.access_count.saturating_add(1);
    }

    /// Whether another agent took part.
    #[must_use]
    pub fn involves(&self, agent: &AgentId) -> bool {
        self.related_agents.binary_search(agent).is_ok()
    }
}
