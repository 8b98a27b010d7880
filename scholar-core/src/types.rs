//! Core type definitions for the scholar memory system.
//!
//! All types are serializable; identifiers are thin newtypes so an agent id
//! can never be passed where a location key is expected.

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Identifier of an agent (e.g. `teacher`, `student_1`), taken from its persona.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    /// Create an agent id from anything string-like.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Key of a location in the world map (e.g. `classroom`, `library`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationKey(pub String);

impl LocationKey {
    /// Create a location key from anything string-like.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocationKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// Lets location maps be queried with a plain `&str`.
impl Borrow<str> for LocationKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identifier of a memory record, assigned monotonically per store.
///
/// Ids are never reused within a store, including across archival and
/// save/load cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub u64);

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Logical simulation time: one (day, period) pair plus the global tick index.
///
/// `tick` counts periods since the start of the run and is what recency
/// scoring measures distance in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SimTime {
    /// Global tick index (monotonically increasing).
    pub tick: u64,
    /// Simulation day, 1-based.
    pub day: u32,
    /// Period index within the day, 0-based.
    pub period: u32,
}

impl SimTime {
    /// Build the simulation time for `day` (1-based) and `period` (0-based).
    #[must_use]
    pub fn new(day: u32, period: u32, periods_per_day: u32) -> Self {
        let tick = u64::from(day.saturating_sub(1)) * u64::from(periods_per_day) + u64::from(period);
        Self { tick, day, period }
    }

    /// Ticks elapsed since `earlier` (zero if `earlier` is in the future).
    #[must_use]
    pub fn ticks_since(&self, earlier: &Self) -> u64 {
        self.tick.saturating_sub(earlier.tick)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {} period {}", self.day, self.period)
    }
}

/// When a memory was formed: simulation time plus wall-clock creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Logical simulation time.
    pub sim: SimTime,
    /// Wall-clock creation time, used only for tie-breaking and reports.
    pub created_at: DateTime<Utc>,
}

impl Timestamp {
    /// Stamp the given simulation time with the current wall-clock time.
    #[must_use]
    pub fn now(sim: SimTime) -> Self {
        Self {
            sim,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Memory classification
// ---------------------------------------------------------------------------

/// Which storage tier a record currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Bounded, recency-ordered buffer.
    ShortTerm,
    /// Unbounded archive of demoted records.
    LongTerm,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortTerm => f.write_str("short_term"),
            Self::LongTerm => f.write_str("long_term"),
        }
    }
}

/// Open-ended memory tag. Only used for filtering in search.
///
/// Well-known tags have their own variants; anything else is kept verbatim
/// in [`MemoryType::Custom`] and round-trips through persistence unchanged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemoryType {
    /// A conversation with other agents.
    Conversation,
    /// The expert teaching a lesson.
    Teaching,
    /// A student learning from a lesson.
    Learning,
    /// A plain event (moving, studying, resting).
    Event,
    /// Something flagged as important.
    Important,
    /// Untyped.
    Other,
    /// Any other tag.
    Custom(String),
}

impl MemoryType {
    /// The canonical tag string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Conversation => "conversation",
            Self::Teaching => "teaching",
            Self::Learning => "learning",
            Self::Event => "event",
            Self::Important => "important",
            Self::Other => "other",
            Self::Custom(tag) => tag,
        }
    }
}

impl From<String> for MemoryType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "conversation" => Self::Conversation,
            "teaching" => Self::Teaching,
            "learning" => Self::Learning,
            "event" => Self::Event,
            "important" => Self::Important,
            "other" => Self::Other,
            _ => Self::Custom(tag),
        }
    }
}

impl From<&str> for MemoryType {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<MemoryType> for String {
    fn from(tag: MemoryType) -> Self {
        match tag {
            MemoryType::Custom(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Retrieval Score
// ---------------------------------------------------------------------------

/// Composite score used to rank memories during search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RetrievalScore(pub OrderedFloat<f64>);

impl RetrievalScore {
    /// Create a retrieval score from a raw f64.
    #[must_use]
    pub fn new(score: f64) -> Self {
        Self(OrderedFloat(score))
    }

    /// Get the raw score value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0.into_inner()
    }
}
