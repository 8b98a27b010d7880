//! The expert's knowledge base.

use crate::config::KnowledgeSpec;

/// One topic and its facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// Topic name.
    pub name: String,
    /// Facts, taught in order.
    pub facts: Vec<String>,
}

/// Topics the expert can teach, in configured order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeBase {
    topics: Vec<Topic>,
}

impl KnowledgeBase {
    /// Build from configuration; blank topics are dropped.
    #[must_use]
    pub fn from_specs(specs: &[KnowledgeSpec]) -> Self {
        let topics = specs
            .iter()
            .filter(|spec| !spec.topic.trim().is_empty())
            .map(|spec| Topic {
                name: spec.topic.trim().to_string(),
                facts: spec.facts.clone(),
            })
            .collect();
        Self { topics }
    }

    /// The topic taught on `day` (1-based): a stable rotation through the list.
    #[must_use]
    pub fn topic_for_day(&self, day: u32) -> Option<&Topic> {
        if self.topics.is_empty() {
            return None;
        }
        let idx = usize::try_from(day.saturating_sub(1)).unwrap_or(0) % self.topics.len();
        self.topics.get(idx)
    }

    /// The `n`th fact of `topic`, cycling when `n` exceeds the list.
    #[must_use]
    pub fn fact(&self, topic: &Topic, n: usize) -> Option<String> {
        if topic.facts.is_empty() {
            return None;
        }
        topic.facts.get(n % topic.facts.len()).cloned()
    }

    /// All topic names.
    pub fn topic_names(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(|t| t.name.as_str())
    }

    /// Whether there is nothing to teach.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> KnowledgeBase {
        KnowledgeBase::from_specs(&[
            KnowledgeSpec { topic: "algebra".into(), facts: vec!["a".into(), "b".into()] },
            KnowledgeSpec { topic: " ".into(), facts: vec![] },
            KnowledgeSpec { topic: "calculus".into(), facts: vec![] },
        ])
    }

    #[test]
    fn topics_rotate_by_day() {
        let kb = base();
        let names: Vec<_> = (1..=4)
            .map(|day| kb.topic_for_day(day).map(|t| t.name.clone()).expect("topic"))
            .collect();
        assert_eq!(names, ["algebra", "calculus", "algebra", "calculus"]);
        assert!(KnowledgeBase::default().topic_for_day(1).is_none());
    }

    #[test]
    fn facts_cycle() {
        let kb = base();
        let algebra = kb.topic_for_day(1).expect("topic").clone();
        assert_eq!(kb.fact(&algebra, 3).as_deref(), Some("b"));
        let calculus = kb.topic_for_day(2).expect("topic").clone();
        assert!(kb.fact(&calculus, 0).is_none());
    }
}
