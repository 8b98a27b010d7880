//! World state: the fixed location map and every agent's current position.
//!
//! The location map is loaded once and shared read-only. The agent →
//! location map is the only writable part of the world and is changed only
//! through [`WorldState::move_agent`] (and [`WorldState::place_agent`] for
//! the initial placement), both of which refuse unknown keys. Writes are
//! serialized behind a lock so concurrent deciders can never interleave a
//! half-applied move.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::types::{AgentId, LocationKey};

/// Descriptive metadata for one location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationInfo {
    /// What the place looks like.
    pub description: String,
    /// What the place is used for.
    pub function: String,
    /// Whether agents meeting here get a conversation opportunity.
    pub social: bool,
}

/// The immutable set of valid locations, in a stable configured order.
#[derive(Debug, Clone)]
pub struct LocationMap {
    order: Vec<LocationKey>,
    entries: HashMap<LocationKey, LocationInfo>,
}

impl LocationMap {
    /// Build the map from `(key, info)` pairs, keeping their order.
    ///
    /// # Errors
    /// Returns [`CoreError::Config`] if the list is empty, or a key is blank
    /// or duplicated.
    pub fn new(locations: impl IntoIterator<Item = (LocationKey, LocationInfo)>) -> Result<Self> {
        let mut order = Vec::new();
        let mut entries = HashMap::new();
        for (key, info) in locations {
            if key.as_str().trim().is_empty() {
                return Err(CoreError::Config("location keys must not be blank".into()));
            }
            if entries.insert(key.clone(), info).is_some() {
                return Err(CoreError::Config(format!("duplicate location '{key}'")));
            }
            order.push(key);
        }
        if order.is_empty() {
            return Err(CoreError::Config("the world needs at least one location".into()));
        }
        Ok(Self { order, entries })
    }

    /// O(1) membership test.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Metadata for `key`, if it exists.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&LocationInfo> {
        self.entries.get(key)
    }

    /// Keys in configured order.
    pub fn keys(&self) -> impl Iterator<Item = &LocationKey> {
        self.order.iter()
    }

    /// `(key, info)` pairs in configured order.
    pub fn iter(&self) -> impl Iterator<Item = (&LocationKey, &LocationInfo)> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key).map(|info| (key, info)))
    }

    /// The first configured location; the deterministic default placement.
    #[must_use]
    pub fn first(&self) -> &LocationKey {
        // `new` rejects empty maps.
        &self.order[0]
    }

    /// Number of locations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Always false for a constructed map; provided for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether the location is marked as a place where conversations happen.
    #[must_use]
    pub fn is_social(&self, key: &str) -> bool {
        self.get(key).is_some_and(|info| info.social)
    }
}

/// Authoritative locations plus the mutable agent → location map.
#[derive(Debug)]
pub struct WorldState {
    locations: Arc<LocationMap>,
    positions: RwLock<BTreeMap<AgentId, LocationKey>>,
}

impl WorldState {
    /// Create a world with no agents placed yet.
    #[must_use]
    pub fn new(locations: LocationMap) -> Self {
        Self {
            locations: Arc::new(locations),
            positions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Shared handle to the read-only location map.
    #[must_use]
    pub fn locations(&self) -> &Arc<LocationMap> {
        &self.locations
    }

    /// O(1) check that `key` names a real location.
    #[must_use]
    pub fn is_valid_location(&self, key: &str) -> bool {
        self.locations.contains(key)
    }

    /// Put an agent into the world for the first time.
    ///
    /// With no configured location the agent starts at the first location
    /// in the map's stable order.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidDestination`] if `initial` is not a known
    /// location.
    pub fn place_agent(&self, agent: &AgentId, initial: Option<&LocationKey>) -> Result<LocationKey> {
        let location = match initial {
            Some(key) if self.is_valid_location(key.as_str()) => key.clone(),
            Some(key) => {
                return Err(CoreError::InvalidDestination {
                    agent: agent.clone(),
                    destination: key.clone(),
                });
            }
            None => self.locations.first().clone(),
        };
        self.positions.write().insert(agent.clone(), location.clone());
        debug!(agent = %agent, location = %location, "Agent placed");
        Ok(location)
    }

    /// Move an agent, returning the location it left.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidDestination`] if `destination` is unknown
    /// (the agent stays put), or [`CoreError::UnknownAgent`] if the agent was
    /// never placed.
    pub fn move_agent(&self, agent: &AgentId, destination: &LocationKey) -> Result<LocationKey> {
        if !self.is_valid_location(destination.as_str()) {
            return Err(CoreError::InvalidDestination {
                agent: agent.clone(),
                destination: destination.clone(),
            });
        }
        let mut positions = self.positions.write();
        let slot = positions
            .get_mut(agent)
            .ok_or_else(|| CoreError::UnknownAgent(agent.clone()))?;
        let previous = std::mem::replace(slot, destination.clone());
        Ok(previous)
    }

    /// Where the agent currently is.
    #[must_use]
    pub fn location_of(&self, agent: &AgentId) -> Option<LocationKey> {
        self.positions.read().get(agent).cloned()
    }

    /// All agents currently at `location`, in id order.
    #[must_use]
    pub fn agents_at(&self, location: &str) -> BTreeSet<AgentId> {
        self.positions
            .read()
            .iter()
            .filter(|(_, at)| at.as_str() == location)
            .map(|(agent, _)| agent.clone())
            .collect()
    }

    /// Occupants of every location, in the map's stable order.
    #[must_use]
    pub fn occupancy(&self) -> Vec<(LocationKey, Vec<AgentId>)> {
        let positions = self.positions.read();
        self.locations
            .keys()
            .map(|key| {
                let here = positions
                    .iter()
                    .filter(|(_, at)| *at == key)
                    .map(|(agent, _)| agent.clone())
                    .collect();
                (key.clone(), here)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campus() -> WorldState {
        let map = LocationMap::new([
            (LocationKey::from("classroom"), LocationInfo { social: true, ..Default::default() }),
            (LocationKey::from("library"), LocationInfo::default()),
            (LocationKey::from("park"), LocationInfo { social: true, ..Default::default() }),
        ])
        .expect("map");
        WorldState::new(map)
    }

    #[test]
    fn empty_or_duplicate_maps_are_rejected() {
        assert!(LocationMap::new(Vec::new()).is_err());
        let dup = LocationMap::new([
            (LocationKey::from("a"), LocationInfo::default()),
            (LocationKey::from("a"), LocationInfo::default()),
        ]);
        assert!(dup.is_err());
    }

    #[test]
    fn default_placement_is_first_location() {
        let world = campus();
        let alice = AgentId::from("alice");
        let at = world.place_agent(&alice, None).expect("place");
        assert_eq!(at.as_str(), "classroom");
    }

    #[test]
    fn invalid_move_leaves_agent_in_place() {
        let world = campus();
        let alice = AgentId::from("alice");
        world.place_agent(&alice, Some(&"library".into())).expect("place");

        let err = world.move_agent(&alice, &"unknown".into()).expect_err("must fail");
        assert!(matches!(err, CoreError::InvalidDestination { .. }));
        assert_eq!(world.location_of(&alice).expect("placed").as_str(), "library");
    }

    #[test]
    fn move_returns_previous_location() {
        let world = campus();
        let bob = AgentId::from("bob");
        world.place_agent(&bob, None).expect("place");
        let previous = world.move_agent(&bob, &"park".into()).expect("move");
        assert_eq!(previous.as_str(), "classroom");
        assert!(world.agents_at("park").contains(&bob));
        assert!(world.agents_at("classroom").is_empty());
    }

    #[test]
    fn moving_an_unplaced_agent_fails() {
        let world = campus();
        let ghost = AgentId::from("ghost");
        assert!(matches!(
            world.move_agent(&ghost, &"park".into()),
            Err(CoreError::UnknownAgent(_))
        ));
    }

    #[test]
    fn occupancy_follows_map_order() {
        let world = campus();
        for id in ["b", "a"] {
            world.place_agent(&AgentId::from(id), Some(&"park".into())).expect("place");
        }
        let occupancy = world.occupancy();
        let keys: Vec<_> = occupancy.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["classroom", "library", "park"]);
        assert_eq!(occupancy[2].1, vec![AgentId::from("a"), AgentId::from("b")]);
    }
}
