//! Knowledge probe.
//!
//! Counts, per agent and topic, the `learning` and `teaching` memories that
//! mention the topic. A probe before and after a run shows what every
//! agent picked up. There is no grading.

use std::collections::BTreeMap;

use scholar_core::{AgentId, MemoryType};
use serde::Serialize;

use crate::agent::Agent;

/// Matching memories for one topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TopicCounts {
    /// `learning` memories mentioning the topic.
    pub learning: usize,
    /// `teaching` memories mentioning the topic.
    pub teaching: usize,
}

impl TopicCounts {
    /// Both kinds together.
    #[must_use]
    pub fn total(&self) -> usize {
        self.learning + self.teaching
    }
}

/// One probe over every agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    /// `pre`, `post` or any caller label.
    pub label: String,
    /// Per agent, per topic.
    pub agents: BTreeMap<AgentId, BTreeMap<String, TopicCounts>>,
}

/// How one agent's counts for one topic changed between two probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnowledgeChange {
    /// Whose memories.
    pub agent: AgentId,
    /// Which topic.
    pub topic: String,
    /// Earlier counts.
    pub before: TopicCounts,
    /// Later counts.
    pub after: TopicCounts,
}

impl KnowledgeChange {
    /// Memories gained on the topic.
    #[must_use]
    pub fn gained(&self) -> usize {
        self.after.total().saturating_sub(self.before.total())
    }
}

/// Probe one agent. Matching memories count as accessed.
pub fn probe_agent(agent: &mut Agent, topics: &[String]) -> BTreeMap<String, TopicCounts> {
    topics
        .iter()
        .map(|topic| {
            let memory = agent.memory_mut();
            let counts = TopicCounts {
                learning: memory.search(topic, Some(MemoryType::Learning), None).len(),
                teaching: memory.search(topic, Some(MemoryType::Teaching), None).len(),
            };
            (topic.clone(), counts)
        })
        .collect()
}

/// Probe every agent.
pub fn probe<'a>(label: &str, agents: impl IntoIterator<Item = &'a mut Agent>, topics: &[String]) -> ProbeReport {
    let agents = agents
        .into_iter()
        .map(|agent| {
            let counts = probe_agent(agent, topics);
            (agent.id().clone(), counts)
        })
        .collect();
    ProbeReport {
        label: label.to_string(),
        agents,
    }
}

impl ProbeReport {
    /// Counts for `agent` on `topic`; zero when the agent or topic is absent.
    #[must_use]
    pub fn count(&self, agent: &AgentId, topic: &str) -> TopicCounts {
        self.agents
            .get(agent)
            .and_then(|topics| topics.get(topic))
            .copied()
            .unwrap_or_default()
    }

    /// Every (agent, topic) pair of `later`, compared against this probe.
    #[must_use]
    pub fn compare(&self, later: &ProbeReport) -> Vec<KnowledgeChange> {
        later
            .agents
            .iter()
            .flat_map(|(agent, topics)| {
                topics.iter().map(move |(topic, after)| KnowledgeChange {
                    agent: agent.clone(),
                    topic: topic.clone(),
                    before: self.count(agent, topic),
                    after: *after,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use scholar_core::{LocationInfo, LocationKey, LocationMap, MemoryConfig, MemoryDraft, MemoryStore, RetrievalConfig};

    use super::*;
    use crate::config::TownConfig;

    fn student() -> Agent {
        let persona = TownConfig::default().personas[1].clone();
        let map = LocationMap::new([(LocationKey::from("classroom"), LocationInfo::default())]).expect("map");
        let memory = MemoryStore::new(
            AgentId::new(persona.id.clone()),
            Arc::new(map),
            &MemoryConfig::default(),
            &RetrievalConfig::default(),
        );
        Agent::new(Arc::new(persona), memory, "classroom".into(), "classroom".into())
    }

    #[test]
    fn counts_only_learning_and_teaching() {
        let mut agent = student();
        let memory = agent.memory_mut();
        for (content, tag) in [
            ("Learned about calculus: derivatives", MemoryType::Learning),
            ("Talked about calculus homework", MemoryType::Conversation),
            ("Learned about geometry: triangles", MemoryType::Learning),
        ] {
            memory.remember(MemoryDraft::new(content, "classroom", tag)).expect("remember");
        }

        let topics = vec!["calculus".to_string(), "algebra".to_string()];
        let before = ProbeReport::default();
        let after = probe("post", [&mut agent], &topics);
        let id = agent.id().clone();

        assert_eq!(after.count(&id, "calculus"), TopicCounts { learning: 1, teaching: 0 });
        assert_eq!(after.count(&id, "algebra").total(), 0);

        let changes = before.compare(&after);
        assert_eq!(changes.len(), 2);
        let calculus = changes.iter().find(|c| c.topic == "calculus").expect("calculus");
        assert_eq!(calculus.gained(), 1);
    }
}
