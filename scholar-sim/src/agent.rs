//! A single simulated agent.
//!
//! Expert and student share one type; the difference is data: the role,
//! the optional knowledge base, and the schedule built from the persona.

use std::sync::Arc;

use scholar_core::memory::{MemoryDraft, MemoryStore};
use scholar_core::{AgentId, LocationKey, LocationMap, MemoryId, MemoryType, SimTime};
use scholar_llm::prompt::{self, render_template};
use tracing::debug;

use crate::config::{PeriodKind, PeriodSpec, PersonaConfig};
use crate::error::{Result, SimError};
use crate::knowledge::KnowledgeBase;
use crate::schedule::{Activity, Schedule};

pub use crate::config::Role;

/// Where an agent wants to be this tick and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    /// Who.
    pub agent: AgentId,
    /// What it will do there.
    pub activity: Activity,
    /// Requested destination (validated by the world).
    pub destination: LocationKey,
    /// The memory that changed the plan, if any.
    pub prompted_by: Option<MemoryId>,
}

/// Persona, memory and plans of one agent.
#[derive(Debug)]
pub struct Agent {
    id: AgentId,
    persona: Arc<PersonaConfig>,
    memory: MemoryStore,
    schedule: Schedule,
    knowledge: Option<KnowledgeBase>,
}

impl Agent {
    /// Assemble an agent. Only experts get a knowledge base.
    #[must_use]
    pub fn new(persona: Arc<PersonaConfig>, memory: MemoryStore, class_location: LocationKey, home: LocationKey) -> Self {
        let id = memory.owner().clone();
        let schedule = Schedule::new(persona.role, &persona.schedule, class_location, home);
        let knowledge = (persona.role == Role::Expert).then(|| KnowledgeBase::from_specs(&persona.knowledge));
        Self {
            id,
            persona,
            memory,
            schedule,
            knowledge,
        }
    }

    /// Agent id.
    #[must_use]
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.persona.display_name()
    }

    /// Persona configuration.
    #[must_use]
    pub fn persona(&self) -> &PersonaConfig {
        &self.persona
    }

    /// Expert or student.
    #[must_use]
    pub fn role(&self) -> Role {
        self.persona.role
    }

    /// The expert's knowledge base; `None` for students.
    #[must_use]
    pub fn knowledge(&self) -> Option<&KnowledgeBase> {
        self.knowledge.as_ref()
    }

    /// Read-only view of the memory store.
    #[must_use]
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// The memory store; only the owning agent's turn may mutate it.
    pub fn memory_mut(&mut self) -> &mut MemoryStore {
        &mut self.memory
    }

    /// Swap in a store restored from disk.
    ///
    /// # Errors
    /// [`SimError::Config`] if the store belongs to another agent.
    pub fn replace_memory(&mut self, store: MemoryStore) -> Result<()> {
        if store.owner() != &self.id {
            return Err(SimError::Config(format!(
                "memory store of '{}' cannot be given to '{}'",
                store.owner(),
                self.id
            )));
        }
        self.memory = store;
        Ok(())
    }

    /// Pick this tick's destination.
    ///
    /// During free periods a recent, important conversation pulls the agent
    /// back to the (social) place where it happened.
    ///
    /// # Errors
    /// [`SimError::Decision`] when the schedule has no plan for the period.
    pub fn decide(
        &mut self,
        now: SimTime,
        period: &PeriodSpec,
        locations: &LocationMap,
        redirect_importance: f32,
    ) -> Result<Intent> {
        self.memory.advance_clock(now);
        let slot = self
            .schedule
            .slot(now.day, now.period, period.kind, locations)
            .ok_or_else(|| SimError::Decision {
                agent: self.id.clone(),
                reason: format!("no free-time preference for {}", period.name),
            })?;

        if period.kind == PeriodKind::Free {
            if let Some((memory, place)) = self.memorable_place(now, redirect_importance, locations) {
                if place != slot.destination {
                    debug!(agent = %self.id, memory = %memory, place = %place, "Revisiting a memorable place");
                    return Ok(Intent {
                        agent: self.id.clone(),
                        activity: Activity::Revisit,
                        destination: place,
                        prompted_by: Some(memory),
                    });
                }
            }
        }

        Ok(Intent {
            agent: self.id.clone(),
            activity: slot.activity,
            destination: slot.destination,
            prompted_by: None,
        })
    }

    /// A conversation from today or yesterday important enough to revisit.
    fn memorable_place(
        &mut self,
        now: SimTime,
        threshold: f32,
        locations: &LocationMap,
    ) -> Option<(MemoryId, LocationKey)> {
        self.memory
            .search("", Some(MemoryType::Conversation), Some(3))
            .into_iter()
            .find(|record| {
                record.importance >= threshold
                    && record.timestamp.sim.day + 1 >= now.day
                    && locations.is_social(record.location.as_str())
            })
            .map(|record| (record.id, record.location))
    }

    /// Record what the agent just did where it actually is.
    ///
    /// # Errors
    /// Propagates memory validation errors.
    pub fn remember_activity(
        &mut self,
        activity: Activity,
        location: &LocationKey,
        period: &PeriodSpec,
        importance: f32,
    ) -> Result<MemoryId> {
        let content = match activity {
            Activity::Revisit => format!("Went back to the {location} during {}.", period.name),
            other => {
                let mut phrase = other.past_tense().to_string();
                if let Some(first) = phrase.get_mut(..1) {
                    first.make_ascii_uppercase();
                }
                format!("{phrase} at the {location} during {}.", period.name)
            }
        };
        let draft = MemoryDraft::new(content, location.clone(), MemoryType::Event).with_importance(importance);
        Ok(self.memory.remember(draft)?)
    }

    /// Remember one side of a conversation or lesson.
    ///
    /// A chat raises every earlier chat with any of the same partners by
    /// `boost`, so company that keeps recurring becomes worth revisiting.
    ///
    /// # Errors
    /// Propagates memory validation errors.
    pub fn remember_conversation(&mut self, draft: MemoryDraft, boost: f32) -> Result<MemoryId> {
        if draft.memory_type == MemoryType::Conversation && boost > 0.0 {
            let earlier: Vec<MemoryId> = self
                .memory
                .iter()
                .filter(|r| r.memory_type == MemoryType::Conversation)
                .filter(|r| draft.related_agents.iter().any(|partner| r.involves(partner)))
                .map(|r| r.id)
                .collect();
            for id in earlier {
                let importance = self.memory.adjust_importance(id, boost)?;
                debug!(agent = %self.id, memory = %id, importance, "Recurring conversation reinforced");
            }
        }
        Ok(self.memory.remember(draft)?)
    }

    /// Contents of the most recent memories, newest first.
    pub fn recent_context(&mut self, n: usize) -> Vec<String> {
        self.memory.recall(n).into_iter().map(|r| r.content).collect()
    }

    /// Persona system prompt for a conversation or, for the expert, a lesson.
    #[must_use]
    pub fn system_prompt(&self, lesson: bool) -> String {
        let persona = &*self.persona;
        let goals = if persona.goals.is_empty() {
            "none in particular".to_string()
        } else {
            persona.goals.join("; ")
        };
        let role_description = match persona.role {
            Role::Expert => "the teacher on campus",
            Role::Student => "a student on campus",
        };
        let template = if lesson && persona.role == Role::Expert {
            prompt::LESSON_SYSTEM
        } else {
            prompt::CONVERSATION_SYSTEM
        };
        render_template(
            template,
            &[
                ("name", self.name()),
                ("role_description", role_description),
                ("personality", persona.personality.as_str()),
                ("dialogue_style", persona.dialogue_style.as_str()),
                ("goals", goals.as_str()),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SchedulePrefs, TownConfig};
    use scholar_core::{LocationInfo, MemoryConfig, RetrievalConfig, Tier};

    fn campus() -> Arc<LocationMap> {
        Arc::new(
            LocationMap::new([
                (LocationKey::from("classroom"), LocationInfo { social: true, ..Default::default() }),
                (LocationKey::from("library"), LocationInfo::default()),
                (LocationKey::from("park"), LocationInfo { social: true, ..Default::default() }),
            ])
            .expect("map"),
        )
    }

    fn agent(free: &[&str]) -> Agent {
        let mut persona = TownConfig::default().personas[1].clone();
        persona.schedule = SchedulePrefs {
            free: free.iter().map(|s| (*s).to_string()).collect(),
            rest: None,
        };
        let memory = MemoryStore::new(
            AgentId::new(persona.id.clone()),
            campus(),
            &MemoryConfig::default(),
            &RetrievalConfig::default(),
        );
        Agent::new(Arc::new(persona), memory, "classroom".into(), "library".into())
    }

    fn free_period() -> PeriodSpec {
        PeriodSpec { name: "morning_2".into(), kind: PeriodKind::Free }
    }

    #[test]
    fn students_have_no_knowledge_base() {
        let a = agent(&["library"]);
        assert_eq!(a.role(), Role::Student);
        assert!(a.knowledge().is_none());
        assert!(a.system_prompt(true).contains("a student on campus"));
    }

    #[test]
    fn missing_free_plan_is_a_decision_error() {
        let mut a = agent(&[]);
        let err = a
            .decide(SimTime::new(1, 1, 5), &free_period(), &campus(), 0.8)
            .expect_err("no plan");
        assert!(matches!(err, SimError::Decision { .. }));
    }

    #[test]
    fn important_conversation_redirects_free_time() {
        let mut a = agent(&["library"]);
        a.memory_mut().advance_clock(SimTime::new(1, 0, 5));
        let id = a
            .memory_mut()
            .remember(MemoryDraft::new("big news at the park", "park", MemoryType::Conversation).with_importance(0.9))
            .expect("remember");

        let intent = a.decide(SimTime::new(1, 1, 5), &free_period(), &campus(), 0.8).expect("intent");
        assert_eq!(intent.activity, Activity::Revisit);
        assert_eq!(intent.destination.as_str(), "park");
        assert_eq!(intent.prompted_by, Some(id));

        let later = a.decide(SimTime::new(4, 1, 5), &free_period(), &campus(), 0.8).expect("intent");
        assert_eq!(later.destination.as_str(), "library");
    }

    fn importance(a: &Agent, id: MemoryId) -> f32 {
        a.memory().get(id).expect("stored").importance
    }

    fn chat_with(partner: &str) -> MemoryDraft {
        MemoryDraft::new("talked", "park", MemoryType::Conversation)
            .with_importance(0.5)
            .with_related([AgentId::from(partner)])
    }

    #[test]
    fn recurring_partners_reinforce_earlier_chats() {
        let mut a = agent(&["library"]);
        let first = a.remember_conversation(chat_with("student_2"), 0.2).expect("remember");
        let other = a.remember_conversation(chat_with("student_3"), 0.2).expect("remember");
        let again = a.remember_conversation(chat_with("student_2"), 0.2).expect("remember");

        assert!((importance(&a, first) - 0.7).abs() < 1e-6);
        assert!((importance(&a, other) - 0.5).abs() < 1e-6);
        assert!((importance(&a, again) - 0.5).abs() < 1e-6);

        let lesson = MemoryDraft::new("learned", "classroom", MemoryType::Learning)
            .with_importance(0.8)
            .with_related([AgentId::from("student_2")]);
        a.remember_conversation(lesson, 0.2).expect("remember");
        assert!((importance(&a, first) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn activity_memories_are_low_key_events() {
        let mut a = agent(&["library"]);
        let id = a
            .remember_activity(Activity::Study, &"library".into(), &free_period(), 0.2)
            .expect("remember");
        let record = a.memory().get(id).expect("stored");
        assert_eq!(record.content, "Studied at the library during morning_2.");
        assert_eq!(record.memory_type, MemoryType::Event);
        assert_eq!(record.tier, Tier::ShortTerm);
    }
}
