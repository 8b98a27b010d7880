//! Conversations between co-located agents.
//!
//! A conversation is planned from memory reads taken before any text is
//! generated, held asynchronously against a [`TextGenerator`], and turned
//! into one memory draft per participant afterwards. A group containing
//! the expert is a lesson.

use std::collections::BTreeSet;
use std::sync::Arc;

use scholar_core::memory::MemoryDraft;
use scholar_core::{AgentId, LocationKey, MemoryType, WorldState};
use scholar_llm::prompt::{self, format_history, render_template};
use scholar_llm::{GenerationRequest, TextGenerator};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SimulationConfig;
use crate::registry::PersonaRegistry;

/// Ordinary chat or a lesson given by the expert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// Students talking among themselves.
    Chat,
    /// The expert is present.
    Lesson,
}

/// Agents who share a social location this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationGroup {
    /// Where they are.
    pub location: LocationKey,
    /// Participants in id order.
    pub participants: Vec<AgentId>,
    /// The expert, when present.
    pub expert: Option<AgentId>,
}

impl ConversationGroup {
    /// Lesson if the expert is present.
    #[must_use]
    pub fn kind(&self) -> ConversationKind {
        if self.expert.is_some() {
            ConversationKind::Lesson
        } else {
            ConversationKind::Chat
        }
    }
}

/// Groups of two or more agents at social locations, in map order.
///
/// `excluded` agents (skipped this tick) never join a group.
#[must_use]
pub fn form_groups(
    world: &WorldState,
    registry: &PersonaRegistry,
    excluded: &BTreeSet<AgentId>,
) -> Vec<ConversationGroup> {
    let locations = world.locations();
    world
        .occupancy()
        .into_iter()
        .filter(|(location, _)| locations.is_social(location.as_str()))
        .filter_map(|(location, occupants)| {
            let participants: Vec<AgentId> = occupants
                .into_iter()
                .filter(|agent| !excluded.contains(agent))
                .collect();
            if participants.len() < 2 {
                return None;
            }
            let expert = participants.iter().find(|id| registry.is_expert(id)).cloned();
            Some(ConversationGroup {
                location,
                participants,
                expert,
            })
        })
        .collect()
}

/// One participant's prompt material, read before generation starts.
#[derive(Debug, Clone)]
pub struct Speaker {
    /// Agent id.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Rendered persona prompt.
    pub system_prompt: String,
    /// Formatted recent memories.
    pub memories: String,
}

/// Everything needed to hold a conversation without touching agent state.
#[derive(Debug, Clone)]
pub struct ConversationPlan {
    /// Who and where.
    pub group: ConversationGroup,
    /// Subject of the talk.
    pub topic: String,
    /// The fact the expert teaches (lessons only).
    pub fact: Option<String>,
    /// Human-readable time, e.g. `day 2 period 1 (afternoon_1)`.
    pub time_label: String,
    /// Description of the location.
    pub location_description: String,
    /// Speaking order: the expert first, then by id.
    pub speakers: Vec<Speaker>,
    /// Rounds of dialogue.
    pub rounds: u32,
    /// Generation parameters; prompts are filled per turn.
    pub request_defaults: GenerationRequest,
}

/// One line of dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    /// Who spoke.
    pub speaker: AgentId,
    /// What was said.
    pub text: String,
    /// Whether the line came from the fallback template.
    pub fallback: bool,
}

/// A finished conversation.
#[derive(Debug, Clone)]
pub struct Transcript {
    /// The plan it was held from.
    pub plan: ConversationPlan,
    /// Lines in speaking order.
    pub turns: Vec<Turn>,
}

impl Transcript {
    /// Lines produced by the fallback template.
    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.turns.iter().filter(|t| t.fallback).count()
    }

    fn first_line_of(&self, id: &AgentId) -> Option<&str> {
        self.turns.iter().find(|t| &t.speaker == id).map(|t| t.text.as_str())
    }

    fn last_line_not_of(&self, id: &AgentId) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| &t.speaker != id)
    }

    fn name_of<'a>(&'a self, id: &'a AgentId) -> &'a str {
        self.plan
            .speakers
            .iter()
            .find(|s| &s.id == id)
            .map_or(id.as_str(), |s| s.name.as_str())
    }
}

/// Hold the conversation: every speaker talks once per round.
///
/// A failed generation is replaced by a templated line and marked as a
/// fallback; it never aborts the conversation.
pub async fn hold<G: TextGenerator>(generator: Arc<G>, plan: ConversationPlan) -> Transcript {
    let fact = plan.fact.clone().unwrap_or_else(|| format!("the basics of {}", plan.topic));
    let mut history: Vec<(String, String)> = Vec::new();
    let mut turns = Vec::new();

    for _ in 0..plan.rounds {
        for speaker in &plan.speakers {
            let teaching = plan.group.expert.as_ref() == Some(&speaker.id);
            let others = plan
                .speakers
                .iter()
                .filter(|s| s.id != speaker.id)
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let vars = [
                ("name", speaker.name.as_str()),
                ("location", plan.group.location.as_str()),
                ("location_description", plan.location_description.as_str()),
                ("time", plan.time_label.as_str()),
                ("topic", plan.topic.as_str()),
                ("participants", others.as_str()),
                ("memories", speaker.memories.as_str()),
                ("fact", fact.as_str()),
            ];
            let history_text = format_history(&history);
            let mut user_vars = vars.to_vec();
            user_vars.push(("history", history_text.as_str()));

            let template = if teaching { prompt::LESSON_USER } else { prompt::CONVERSATION_USER };
            let request = GenerationRequest {
                system: speaker.system_prompt.clone(),
                user: render_template(template, &user_vars),
                ..plan.request_defaults.clone()
            };

            let (text, fallback) = match generator.generate(&request).await {
                Ok(response) => (response.text, false),
                Err(e) => {
                    warn!(
                        backend = generator.backend(),
                        speaker = %speaker.id,
                        location = %plan.group.location,
                        error = %e,
                        "Generation failed, using fallback line"
                    );
                    let fallback = if teaching { prompt::FALLBACK_LESSON } else { prompt::FALLBACK_TURN };
                    (render_template(fallback, &vars), true)
                }
            };
            history.push((speaker.name.clone(), text.clone()));
            turns.push(Turn {
                speaker: speaker.id.clone(),
                text,
                fallback,
            });
        }
    }

    debug!(
        location = %plan.group.location,
        participants = plan.speakers.len(),
        turns = turns.len(),
        "Conversation finished"
    );
    Transcript { plan, turns }
}

/// One memory draft per participant, from that participant's perspective.
///
/// Every draft carries the group's real location and names the other
/// participants as related agents.
#[must_use]
pub fn perspective_drafts(transcript: &Transcript, config: &SimulationConfig) -> Vec<(AgentId, MemoryDraft)> {
    let plan = &transcript.plan;
    let group = &plan.group;
    let topic = plan.topic.as_str();

    group
        .participants
        .iter()
        .map(|me| {
            let others: Vec<AgentId> = group.participants.iter().filter(|a| *a != me).cloned().collect();
            let other_names = others
                .iter()
                .map(|a| transcript.name_of(a))
                .collect::<Vec<_>>()
                .join(", ");

            let (content, memory_type, importance) = match &group.expert {
                Some(expert) if expert == me => {
                    let detail = plan.fact.as_deref().unwrap_or(topic);
                    (
                        format!("Taught {topic} to {other_names} at the {}: {detail}.", group.location),
                        MemoryType::Teaching,
                        config.lesson_importance,
                    )
                }
                Some(expert) => {
                    let line = transcript.first_line_of(expert).unwrap_or(topic);
                    (
                        format!(
                            "Learned about {topic} from {} at the {}: \"{line}\"",
                            transcript.name_of(expert),
                            group.location
                        ),
                        MemoryType::Learning,
                        config.lesson_importance,
                    )
                }
                None => {
                    let mut content = format!("Talked with {other_names} at the {} about {topic}.", group.location);
                    if let Some(turn) = transcript.last_line_not_of(me) {
                        content.push_str(&format!(" {} said: \"{}\"", transcript.name_of(&turn.speaker), turn.text));
                    }
                    (content, MemoryType::Conversation, config.conversation_importance)
                }
            };

            let draft = MemoryDraft::new(content, group.location.clone(), memory_type)
                .with_importance(importance)
                .with_related(others);
            (me.clone(), draft)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholar_core::{LocationInfo, LocationMap};
    use scholar_llm::ScriptedGenerator;

    use crate::config::TownConfig;

    fn speaker(id: &str) -> Speaker {
        Speaker {
            id: AgentId::from(id),
            name: id.to_uppercase(),
            system_prompt: format!("You are {id}."),
            memories: "(nothing yet)".into(),
        }
    }

    fn plan(ids: &[&str], expert: Option<&str>) -> ConversationPlan {
        ConversationPlan {
            group: ConversationGroup {
                location: LocationKey::from("park"),
                participants: ids.iter().map(|i| AgentId::from(*i)).collect(),
                expert: expert.map(AgentId::from),
            },
            topic: "calculus".into(),
            fact: expert.map(|_| "derivatives measure change".to_string()),
            time_label: "day 1 period 1".into(),
            location_description: "a lawn".into(),
            speakers: ids.iter().map(|i| speaker(i)).collect(),
            rounds: 2,
            request_defaults: GenerationRequest::new("", ""),
        }
    }

    #[test]
    fn groups_need_two_agents_at_a_social_place() {
        let map = LocationMap::new([
            (LocationKey::from("park"), LocationInfo { social: true, ..Default::default() }),
            (LocationKey::from("library"), LocationInfo::default()),
        ])
        .expect("map");
        let world = WorldState::new(map);
        for (agent, at) in [("student_1", "park"), ("teacher", "park"), ("student_2", "library"), ("student_3", "library")] {
            world.place_agent(&AgentId::from(agent), Some(&at.into())).expect("place");
        }
        let registry = PersonaRegistry::from_configs(&TownConfig::default().personas).expect("registry");

        let groups = form_groups(&world, &registry, &BTreeSet::new());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].kind(), ConversationKind::Lesson);
        assert_eq!(groups[0].expert, Some(AgentId::from("teacher")));

        let excluded = BTreeSet::from([AgentId::from("teacher")]);
        assert!(form_groups(&world, &registry, &excluded).is_empty());
    }

    #[tokio::test]
    async fn every_speaker_talks_each_round() {
        let generator = Arc::new(ScriptedGenerator::new(1));
        let transcript = hold(Arc::clone(&generator), plan(&["a", "b"], None)).await;
        let speakers: Vec<_> = transcript.turns.iter().map(|t| t.speaker.as_str()).collect();
        assert_eq!(speakers, ["a", "b", "a", "b"]);
        assert_eq!(transcript.fallback_count(), 0);
        assert_eq!(generator.requests().len(), 4);
        assert!(generator.requests()[1].user.contains("A: "));
    }

    #[tokio::test]
    async fn failures_fall_back_to_templates() {
        let transcript = hold(Arc::new(ScriptedGenerator::failing()), plan(&["t", "s"], Some("t"))).await;
        assert_eq!(transcript.fallback_count(), 4);
        assert_eq!(transcript.turns[0].text, "T explains calculus: derivatives measure change");
        assert_eq!(transcript.turns[1].text, "S chats with T about calculus.");
    }

    #[tokio::test]
    async fn lesson_perspectives_split_teaching_and_learning() {
        let transcript = hold(Arc::new(ScriptedGenerator::new(3)), plan(&["s", "t"], Some("t"))).await;
        let drafts = perspective_drafts(&transcript, &SimulationConfig::default());
        assert_eq!(drafts.len(), 2);

        let (student, learned) = &drafts[0];
        assert_eq!(student.as_str(), "s");
        assert_eq!(learned.memory_type, MemoryType::Learning);
        assert_eq!(learned.related_agents, vec![AgentId::from("t")]);
        assert!(learned.content.contains("calculus"));

        let (teacher, taught) = &drafts[1];
        assert_eq!(teacher.as_str(), "t");
        assert_eq!(taught.memory_type, MemoryType::Teaching);
        assert_eq!(taught.location, learned.location);
    }
}
