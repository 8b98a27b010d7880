//! The two-tier memory store owned by a single agent.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{MemoryConfig, RetrievalConfig};
use crate::error::{CoreError, Result};
use crate::persistence::{self, MemoryDocument};
use crate::retrieval::{self, SearchQuery};
use crate::types::{AgentId, MemoryId, MemoryType, SimTime, Tier};
use crate::world::LocationMap;

use super::record::{MemoryDraft, MemoryRecord};

/// Short-term buffer plus long-term archive for one agent.
///
/// Both tiers are kept in creation (id) order. The store carries its own
/// simulation clock; every new record is stamped with it, so the short-term
/// buffer is always ordered by time as well as by id.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    owner: AgentId,
    short_term: VecDeque<MemoryRecord>,
    long_term: Vec<MemoryRecord>,
    next_id: u64,
    clock: SimTime,
    locations: Arc<LocationMap>,
    config: MemoryConfig,
    retrieval: RetrievalConfig,
}

/// Result of [`MemoryStore::load`].
#[derive(Debug)]
pub enum LoadOutcome {
    /// A memory file existed and was restored.
    Loaded(MemoryStore),
    /// There was no memory file yet; the store starts empty.
    Empty(MemoryStore),
}

impl LoadOutcome {
    /// The store, whichever way it was obtained.
    #[must_use]
    pub fn into_store(self) -> MemoryStore {
        match self {
            Self::Loaded(store) | Self::Empty(store) => store,
        }
    }

    /// Whether a file was actually read.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

/// Side-effect free overview of a store's contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemorySummary {
    /// Store owner.
    pub owner: AgentId,
    /// Records in the short-term buffer.
    pub short_term: usize,
    /// Records in the long-term archive.
    pub long_term: usize,
    /// Record count per memory type tag, across both tiers.
    pub by_type: BTreeMap<String, usize>,
}

impl MemorySummary {
    /// Records across both tiers.
    #[must_use]
    pub fn total(&self) -> usize {
        self.short_term + self.long_term
    }
}

impl MemoryStore {
    /// Create an empty store for `owner`.
    #[must_use]
    pub fn new(
        owner: AgentId,
        locations: Arc<LocationMap>,
        config: &MemoryConfig,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            owner,
            short_term: VecDeque::with_capacity(config.short_term_capacity + 1),
            long_term: Vec::new(),
            next_id: 1,
            clock: SimTime::default(),
            locations,
            config: config.clone(),
            retrieval: retrieval.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The agent this store belongs to.
    #[must_use]
    pub fn owner(&self) -> &AgentId {
        &self.owner
    }

    /// Current simulation time as seen by this store.
    #[must_use]
    pub fn clock(&self) -> SimTime {
        self.clock
    }

    /// Short-term records, oldest first.
    pub fn short_term(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.short_term.iter()
    }

    /// Long-term records in archival order (oldest first).
    #[must_use]
    pub fn long_term(&self) -> &[MemoryRecord] {
        &self.long_term
    }

    /// Every record, archive first, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.long_term.iter().chain(self.short_term.iter())
    }

    /// Total records across both tiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.short_term.len() + self.long_term.len()
    }

    /// Whether the store holds no records at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.short_term.is_empty() && self.long_term.is_empty()
    }

    /// Look up a record in either tier without touching its access count.
    #[must_use]
    pub fn get(&self, id: MemoryId) -> Option<&MemoryRecord> {
        if let Ok(idx) = self.long_term.binary_search_by_key(&id, |r| r.id) {
            return self.long_term.get(idx);
        }
        self.short_term
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .and_then(|idx| self.short_term.get(idx))
    }

    fn get_mut(&mut self, id: MemoryId) -> Option<&mut MemoryRecord> {
        if let Ok(idx) = self.long_term.binary_search_by_key(&id, |r| r.id) {
            return self.long_term.get_mut(idx);
        }
        match self.short_term.binary_search_by_key(&id, |r| r.id) {
            Ok(idx) => self.short_term.get_mut(idx),
            Err(_) => None,
        }
    }

    /// Move the store's clock forward. Earlier times are ignored.
    pub fn advance_clock(&mut self, now: SimTime) {
        if now > self.clock {
            self.clock = now;
        }
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Record a new experience at the tail of the short-term buffer.
    ///
    /// If the buffer then exceeds its capacity the oldest record is archived.
    ///
    /// # Errors
    /// [`CoreError::InvalidLocation`] or [`CoreError::InvalidImportance`];
    /// the store is unchanged on error and no id is consumed.
    pub fn remember(&mut self, draft: MemoryDraft) -> Result<MemoryId> {
        let id = MemoryId(self.next_id);
        let record = MemoryRecord::new(
            id,
            self.owner.clone(),
            draft,
            self.clock,
            &self.locations,
            &self.config,
        )?;
        self.next_id += 1;

        debug!(
            owner = %self.owner,
            memory = %id,
            memory_type = %record.memory_type,
            location = %record.location,
            "Memory recorded"
        );
        self.short_term.push_back(record);

        while self.short_term.len() > self.config.short_term_capacity {
            self.archive_oldest();
        }
        Ok(id)
    }

    /// Demote the oldest short-term record to the archive.
    ///
    /// Returns the archived id, or `None` if the buffer was empty.
    pub fn archive_oldest(&mut self) -> Option<MemoryId> {
        let mut record = self.short_term.pop_front()?;
        record.tier = Tier::LongTerm;
        let id = record.id;
        self.long_term.push(record);
        debug!(owner = %self.owner, memory = %id, "Memory archived to long-term");
        Some(id)
    }

    /// Shift a record's importance by `delta`, clamped into bounds.
    ///
    /// Returns the new importance.
    ///
    /// # Errors
    /// [`CoreError::NotFound`] if `id` is in neither tier.
    pub fn adjust_importance(&mut self, id: MemoryId, delta: f32) -> Result<f32> {
        let current = self.get(id).ok_or(CoreError::NotFound(id))?.importance;
        let updated = self.config.clamp_importance(current + delta);
        if let Some(record) = self.get_mut(id) {
            record.importance = updated;
        }
        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Retrieval
    // ------------------------------------------------------------------

    /// The `n` most recent short-term records, most recent first.
    ///
    /// Each returned record's access count is incremented.
    pub fn recall(&mut self, n: usize) -> Vec<MemoryRecord> {
        self.short_term
            .iter_mut()
            .rev()
            .take(n)
            .map(|record| {
                record.record_access();
                record.clone()
            })
            .collect()
    }

    /// Ranked lexical search over both tiers.
    ///
    /// `memory_type` restricts results to one tag; `top_k` caps the number
    /// of results (`None` returns every match). Each returned record's
    /// access count is incremented exactly once.
    pub fn search(
        &mut self,
        query: &str,
        memory_type: Option<MemoryType>,
        top_k: Option<usize>,
    ) -> Vec<MemoryRecord> {
        let query = SearchQuery::new(query).with_type(memory_type).with_top_k(top_k);
        let hits = retrieval::rank(self.iter(), &query, &self.clock, &self.retrieval);

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Some(record) = self.get_mut(hit.id) {
                record.record_access();
                results.push(record.clone());
            }
        }
        debug!(
            owner = %self.owner,
            results = results.len(),
            "Memory search"
        );
        results
    }

    /// Counts per tier and per type.
    #[must_use]
    pub fn summary(&self) -> MemorySummary {
        let mut by_type = BTreeMap::new();
        for record in self.iter() {
            *by_type.entry(record.memory_type.as_str().to_string()).or_insert(0) += 1;
        }
        MemorySummary {
            owner: self.owner.clone(),
            short_term: self.short_term.len(),
            long_term: self.long_term.len(),
            by_type,
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Snapshot the store as a serializable document.
    #[must_use]
    pub fn to_document(&self) -> MemoryDocument {
        MemoryDocument {
            owner: self.owner.clone(),
            next_id: self.next_id,
            clock: self.clock,
            short_term: self.short_term.iter().cloned().collect(),
            long_term: self.long_term.clone(),
        }
    }

    /// Rebuild a store from a document.
    ///
    /// Tiers are re-stamped from the array each record came from, the id
    /// counter is moved past every stored id, and if the configured capacity
    /// shrank since the save the excess oldest records are archived.
    ///
    /// # Errors
    /// [`CoreError::Serialization`] if the document belongs to another agent.
    pub fn from_document(
        document: MemoryDocument,
        locations: Arc<LocationMap>,
        config: &MemoryConfig,
        retrieval: &RetrievalConfig,
    ) -> Result<Self> {
        let MemoryDocument {
            owner,
            next_id,
            clock,
            short_term,
            long_term,
        } = document;

        let mut store = Self::new(owner, locations, config, retrieval);
        store.clock = clock;
        store.long_term = long_term;
        store.short_term = short_term.into();
        for record in &mut store.long_term {
            record.tier = Tier::LongTerm;
        }
        for record in &mut store.short_term {
            record.tier = Tier::ShortTerm;
        }
        store.long_term.sort_by_key(|r| r.id);
        store.short_term.make_contiguous().sort_by_key(|r| r.id);

        let max_id = store.iter().map(|r| r.id.0).max().unwrap_or(0);
        store.next_id = next_id.max(max_id + 1);

        while store.short_term.len() > store.config.short_term_capacity {
            store.archive_oldest();
        }
        Ok(store)
    }

    /// Write the store to `path` as one JSON document.
    ///
    /// The document is written to a temporary file next to `path` and then
    /// renamed over it, so a crash never leaves a half-written file.
    ///
    /// # Errors
    /// Persistence errors ([`CoreError::is_persistence`]).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        persistence::write_document(path, &self.to_document())?;
        debug!(
            owner = %self.owner,
            path = %path.display(),
            memories = self.len(),
            "Memory store saved"
        );
        Ok(())
    }

    /// Load the store for `owner` from `path`.
    ///
    /// A missing file is not an error: it yields [`LoadOutcome::Empty`].
    ///
    /// # Errors
    /// Persistence errors for unreadable or malformed files, or a document
    /// that belongs to a different agent.
    pub fn load(
        path: impl AsRef<Path>,
        owner: AgentId,
        locations: Arc<LocationMap>,
        config: &MemoryConfig,
        retrieval: &RetrievalConfig,
    ) -> Result<LoadOutcome> {
        let path = path.as_ref();
        let Some(document) = persistence::read_document(path)? else {
            debug!(owner = %owner, path = %path.display(), "No memory file, starting empty");
            return Ok(LoadOutcome::Empty(Self::new(owner, locations, config, retrieval)));
        };
        if document.owner != owner {
            return Err(CoreError::Serialization(format!(
                "memory file {} belongs to '{}', expected '{owner}'",
                path.display(),
                document.owner
            )));
        }
        let store = Self::from_document(document, locations, config, retrieval)?;
        info!(
            owner = %store.owner,
            short_term = store.short_term.len(),
            long_term = store.long_term.len(),
            "Memory store loaded"
        );
        Ok(LoadOutcome::Loaded(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LocationKey;
    use crate::world::LocationInfo;

    fn locations() -> Arc<LocationMap> {
        Arc::new(
            LocationMap::new(
                ["classroom", "library", "park", "cafeteria", "dormitory"]
                    .into_iter()
                    .map(|k| (LocationKey::from(k), LocationInfo::default())),
            )
            .expect("map"),
        )
    }

    fn store_with_capacity(k: usize) -> MemoryStore {
        let config = MemoryConfig {
            short_term_capacity: k,
            ..MemoryConfig::default()
        };
        MemoryStore::new(
            AgentId::from("student_1"),
            locations(),
            &config,
            &RetrievalConfig::default(),
        )
    }

    #[test]
    fn overflow_archives_oldest_in_creation_order() {
        let mut store = store_with_capacity(3);
        let places = ["classroom", "library", "park", "cafeteria", "dormitory"];
        for (i, place) in places.iter().enumerate() {
            store
                .remember(MemoryDraft::new(format!("event {i}"), *place, "event"))
                .expect("remember");
        }

        let short: Vec<_> = store.short_term().map(|r| r.content.as_str()).collect();
        let long: Vec<_> = store.long_term().iter().map(|r| r.content.as_str()).collect();
        assert_eq!(short, ["event 2", "event 3", "event 4"]);
        assert_eq!(long, ["event 0", "event 1"]);
        assert!(store.long_term().iter().all(|r| r.tier == Tier::LongTerm));
        assert!(store.short_term().all(|r| r.tier == Tier::ShortTerm));
    }

    #[test]
    fn failed_remember_changes_nothing() {
        let mut store = store_with_capacity(3);
        let err = store
            .remember(MemoryDraft::new("lost", "unknown", "event"))
            .expect_err("unknown location");
        assert!(matches!(err, CoreError::InvalidLocation(_)));
        assert!(store.is_empty());

        let id = store
            .remember(MemoryDraft::new("found", "library", "event"))
            .expect("remember");
        assert_eq!(id, MemoryId(1));
    }

    #[test]
    fn recall_is_newest_first_and_counts_access() {
        let mut store = store_with_capacity(5);
        for day in 1..=3 {
            store.advance_clock(SimTime::new(day, 0, 5));
            store
                .remember(MemoryDraft::new(format!("day {day}"), "library", "event"))
                .expect("remember");
        }

        let recalled = store.recall(2);
        let content: Vec<_> = recalled.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(content, ["day 3", "day 2"]);
        assert!(recalled.iter().all(|r| r.access_count == 1));
        assert_eq!(store.get(MemoryId(1)).expect("first").access_count, 0);
    }

    #[test]
    fn calculus_outranks_weather() {
        let mut store = store_with_capacity(5);
        store
            .remember(MemoryDraft::new("taught calculus", "classroom", "teaching").with_importance(0.9))
            .expect("remember");
        store
            .remember(MemoryDraft::new("discussed weather", "park", "conversation").with_importance(0.2))
            .expect("remember");

        let results = store.search("calculus", None, None);
        assert_eq!(results.first().map(|r| r.content.as_str()), Some("taught calculus"));
    }

    #[test]
    fn repeated_search_keeps_result_set() {
        let mut store = store_with_capacity(2);
        for topic in ["algebra basics", "algebra proofs", "poetry", "algebra exam"] {
            store
                .remember(MemoryDraft::new(topic, "classroom", "learning"))
                .expect("remember");
        }

        let first: Vec<_> = store.search("algebra", None, None).iter().map(|r| r.id).collect();
        let second = store.search("algebra", None, None);
        let second_ids: Vec<_> = second.iter().map(|r| r.id).collect();

        let mut a = first.clone();
        let mut b = second_ids.clone();
        a.sort();
        b.sort();
        assert_eq!(a, b);
        assert_eq!(first.len(), 3);
        assert!(second.iter().all(|r| r.access_count == 2));
    }

    #[test]
    fn search_covers_both_tiers_and_filters_type() {
        let mut store = store_with_capacity(1);
        store
            .remember(MemoryDraft::new("calculus lesson", "classroom", "learning"))
            .expect("remember");
        store
            .remember(MemoryDraft::new("calculus gossip", "park", "conversation"))
            .expect("remember");

        assert_eq!(store.long_term().len(), 1);
        assert_eq!(store.search("calculus", None, None).len(), 2);

        let learning = store.search("calculus", Some(MemoryType::Learning), None);
        assert_eq!(learning.len(), 1);
        assert_eq!(learning[0].tier, Tier::LongTerm);

        assert_eq!(store.search("", None, Some(1)).len(), 1);
    }

    #[test]
    fn adjust_importance_clamps_and_reports_missing() {
        let mut store = store_with_capacity(3);
        let id = store
            .remember(MemoryDraft::new("x", "park", "event").with_importance(0.8))
            .expect("remember");

        let raised = store.adjust_importance(id, 0.5).expect("adjust");
        assert!((raised - 1.0).abs() < f32::EPSILON);
        let lowered = store.adjust_importance(id, -4.0).expect("adjust");
        assert!(lowered.abs() < f32::EPSILON);

        assert!(matches!(
            store.adjust_importance(MemoryId(99), 0.1),
            Err(CoreError::NotFound(MemoryId(99)))
        ));
    }

    #[test]
    fn summary_counts_tiers_and_types() {
        let mut store = store_with_capacity(2);
        for (content, tag) in [("a", "event"), ("b", "event"), ("c", "learning")] {
            store.remember(MemoryDraft::new(content, "park", tag)).expect("remember");
        }
        let summary = store.summary();
        assert_eq!(summary.short_term, 2);
        assert_eq!(summary.long_term, 1);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.by_type.get("event"), Some(&2));
        assert_eq!(summary.by_type.get("learning"), Some(&1));
    }

    #[test]
    fn reload_with_smaller_capacity_archives_excess() {
        let mut store = store_with_capacity(4);
        for i in 0..4 {
            store.remember(MemoryDraft::new(format!("m{i}"), "park", "event")).expect("remember");
        }
        let config = MemoryConfig {
            short_term_capacity: 2,
            ..MemoryConfig::default()
        };
        let restored = MemoryStore::from_document(
            store.to_document(),
            locations(),
            &config,
            &RetrievalConfig::default(),
        )
        .expect("restore");
        assert_eq!(restored.short_term().count(), 2);
        assert_eq!(restored.long_term().len(), 2);
        assert_eq!(restored.len(), 4);
    }
}
