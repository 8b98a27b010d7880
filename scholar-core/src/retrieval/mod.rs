//! Lexical memory search (no embeddings).
//!
//! A record matches a query when:
//!   1. the whole query is a substring of its content, or
//!   2. the query has several whitespace-separated words and any of its
//!      tokens is one of the record's indexed content tokens, or
//!   3. the query is a substring of one of the related agent ids, or
//!   4. the query equals the record's memory type tag.
//!
//! An optional memory type filter is applied on top; an empty query matches
//! everything that passes the filter. Matches are ranked by
//! [`scoring::compute_breakdown`], ties broken by creation order.

pub mod scoring;

use std::cmp::Reverse;

use crate::config::RetrievalConfig;
use crate::memory::MemoryRecord;
use crate::types::{MemoryId, MemoryType, RetrievalScore, SimTime};

pub use scoring::ScoreBreakdown;

/// A normalized search request.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    text: String,
    tokens: Vec<String>,
    multi_word: bool,
    memory_type: Option<MemoryType>,
    top_k: Option<usize>,
}

impl SearchQuery {
    /// Build a query from free text. Matching is case-insensitive.
    #[must_use]
    pub fn new(text: &str) -> Self {
        let text = text.trim().to_lowercase();
        let tokens = tokenize(&text);
        let multi_word = text.split_whitespace().nth(1).is_some();
        Self {
            text,
            tokens,
            multi_word,
            memory_type: None,
            top_k: None,
        }
    }

    /// Only return records with this tag.
    #[must_use]
    pub fn with_type(mut self, memory_type: Option<MemoryType>) -> Self {
        self.memory_type = memory_type;
        self
    }

    /// Return at most `top_k` records (`None` = all matches).
    #[must_use]
    pub fn with_top_k(mut self, top_k: Option<usize>) -> Self {
        self.top_k = top_k;
        self
    }

    /// The result limit, if any.
    #[must_use]
    pub fn top_k(&self) -> Option<usize> {
        self.top_k
    }

    /// Whether `record` satisfies the query.
    #[must_use]
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if let Some(wanted) = &self.memory_type {
            if record.memory_type != *wanted {
                return false;
            }
        }
        if self.text.is_empty() {
            return true;
        }

        let content = record.content.to_lowercase();
        if content.contains(&self.text) {
            return true;
        }
        if self.multi_word {
            let indexed = tokenize(&content);
            if self.tokens.iter().any(|t| indexed.contains(t)) {
                return true;
            }
        }
        if record
            .related_agents
            .iter()
            .any(|agent| agent.as_str().to_lowercase().contains(&self.text))
        {
            return true;
        }
        record.memory_type.as_str().eq_ignore_ascii_case(&self.text)
    }
}

/// A scored search hit.
#[derive(Debug, Clone, Copy)]
pub struct ScoredMatch {
    /// The matching record.
    pub id: MemoryId,
    /// Combined score.
    pub score: RetrievalScore,
    /// Per-factor breakdown.
    pub breakdown: ScoreBreakdown,
}

/// Score and rank `candidates` that match `query`, best first.
///
/// Ties keep creation order (smaller id first) so repeated searches are
/// deterministic.
pub fn rank<'a>(
    candidates: impl IntoIterator<Item = &'a MemoryRecord>,
    query: &SearchQuery,
    now: &SimTime,
    config: &RetrievalConfig,
) -> Vec<ScoredMatch> {
    let mut hits: Vec<ScoredMatch> = candidates
        .into_iter()
        .filter(|record| query.matches(record))
        .map(|record| {
            let breakdown = scoring::compute_breakdown(record, now, config);
            ScoredMatch {
                id: record.id,
                score: breakdown.total(),
                breakdown,
            }
        })
        .collect();

    hits.sort_by_key(|hit| (Reverse(hit.score), hit.id));
    if let Some(k) = query.top_k {
        hits.truncate(k);
    }
    hits
}

/// Lower-cased alphanumeric words of at least two characters.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentId, LocationKey, Tier, Timestamp};

    fn record(id: u64, content: &str, memory_type: &str, related: &[&str]) -> MemoryRecord {
        MemoryRecord {
            id: MemoryId(id),
            content: content.to_string(),
            actor: AgentId::from("ana"),
            related_agents: related.iter().map(|a| AgentId::from(*a)).collect(),
            location: LocationKey::from("library"),
            memory_type: MemoryType::from(memory_type),
            timestamp: Timestamp::now(SimTime::default()),
            importance: 0.5,
            access_count: 0,
            tier: Tier::ShortTerm,
        }
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let r = record(1, "Taught Calculus to the class", "teaching", &[]);
        assert!(SearchQuery::new("calculus").matches(&r));
        assert!(SearchQuery::new("  CALC ").matches(&r));
        assert!(!SearchQuery::new("algebra").matches(&r));
    }

    #[test]
    fn multi_word_query_matches_any_token() {
        let r = record(1, "Discussed the weather at the park", "conversation", &[]);
        assert!(SearchQuery::new("weather forecast").matches(&r));
        assert!(!SearchQuery::new("snow forecast").matches(&r));
    }

    #[test]
    fn single_letter_words_still_make_a_multi_word_query() {
        let r = record(1, "taught calculus", "teaching", &[]);
        assert!(SearchQuery::new("a calculus").matches(&r));
        assert!(SearchQuery::new("I calculus").matches(&r));
        assert!(SearchQuery::new("weather calculus").matches(&r));
        assert!(!SearchQuery::new("a b").matches(&r));
    }

    #[test]
    fn related_agents_and_type_tag_match() {
        let r = record(1, "Long chat", "conversation", &["student_2"]);
        assert!(SearchQuery::new("student_2").matches(&r));
        assert!(SearchQuery::new("Conversation").matches(&r));
    }

    #[test]
    fn type_filter_applies_on_top() {
        let r = record(1, "Learned calculus", "learning", &[]);
        assert!(SearchQuery::new("calculus").with_type(Some(MemoryType::Learning)).matches(&r));
        assert!(!SearchQuery::new("calculus").with_type(Some(MemoryType::Teaching)).matches(&r));
        assert!(SearchQuery::new("").with_type(Some(MemoryType::Learning)).matches(&r));
    }

    #[test]
    fn ranking_ties_break_by_id() {
        let records = [record(2, "calculus b", "event", &[]), record(1, "calculus a", "event", &[])];
        let hits = rank(
            records.iter(),
            &SearchQuery::new("calculus"),
            &SimTime::default(),
            &RetrievalConfig::default(),
        );
        let ids: Vec<_> = hits.iter().map(|h| h.id.0).collect();
        assert_eq!(ids, [1, 2]);
    }

    #[test]
    fn tokenize_drops_punctuation_and_single_chars() {
        assert_eq!(tokenize("A quick, quick-test!"), ["quick", "quick", "test"]);
    }
}
