//! The simulation driver: a `NotStarted → Running(day, period) → Finished`
//! state machine advanced one tick at a time.
//!
//! ## Tick pipeline
//!
//! 1. every agent (id order) decides where to go
//! 2. the world validates and applies each move
//! 3. agents remember what they did
//! 4. co-located agents at social places form conversation groups
//! 5. prompts are built from memory, then every group's dialogue is
//!    generated concurrently and joined
//! 6. each participant remembers the conversation, in group order
//! 7. on the last period of an auto-save day, every store is saved

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use scholar_core::config::PersistenceBackend;
use scholar_core::memory::{MemoryStore, MemorySummary};
use scholar_core::persistence::{self, SnapshotDb};
use scholar_core::{AgentId, LocationInfo, LocationKey, LocationMap, MemoryId, SimTime, WorldState};
use scholar_llm::prompt::format_memories;
use scholar_llm::{ConfiguredGenerator, GenerationRequest, TextGenerator};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::agent::{Agent, Intent};
use crate::config::{PeriodSpec, TownConfig};
use crate::conversation::{self, ConversationGroup, ConversationKind, ConversationPlan, Speaker, Transcript};
use crate::error::{Result, SimError};
use crate::exam::{self, KnowledgeChange, ProbeReport};
use crate::registry::PersonaRegistry;
use crate::schedule::Activity;

/// Where the run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverState {
    /// No tick has run yet.
    NotStarted,
    /// The next tick to run.
    Running {
        /// 1-based day.
        day: u32,
        /// 0-based period.
        period: u32,
    },
    /// Every tick has run.
    Finished,
}

/// An accepted move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRecord {
    /// Who moved.
    pub agent: AgentId,
    /// Where from.
    pub from: LocationKey,
    /// Where to.
    pub to: LocationKey,
    /// What the agent went there to do.
    pub activity: String,
    /// The memory behind the decision, if any.
    pub prompted_by: Option<MemoryId>,
}

/// A move the world refused; the agent stayed where it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedMove {
    /// Who tried to move.
    pub agent: AgentId,
    /// The refused destination.
    pub destination: LocationKey,
    /// Why.
    pub reason: String,
}

/// One conversation held during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationReport {
    /// Where.
    pub location: LocationKey,
    /// Chat or lesson.
    pub kind: ConversationKind,
    /// Who took part.
    pub participants: Vec<AgentId>,
    /// What it was about.
    pub topic: String,
    /// Lines spoken.
    pub turns: usize,
    /// Lines produced by the fallback template.
    pub fallbacks: usize,
}

/// Outcome of the auto-save step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveStatus {
    /// Not a save tick.
    NotDue,
    /// Every store was written.
    Saved {
        /// Stores written.
        agents: usize,
    },
    /// Both attempts failed; the run continues in memory.
    Failed {
        /// Last error.
        error: String,
    },
}

/// Everything that happened during one tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    /// When.
    pub time: SimTime,
    /// Period name.
    pub period: String,
    /// Accepted moves.
    pub moves: Vec<MoveRecord>,
    /// Refused moves.
    pub rejected_moves: Vec<RejectedMove>,
    /// Agents that could not decide and sat the tick out.
    pub skipped: Vec<AgentId>,
    /// Conversations, in location order.
    pub conversations: Vec<ConversationReport>,
    /// Auto-save outcome.
    pub save: SaveStatus,
}

impl TickReport {
    /// Fallback lines across every conversation of the tick.
    #[must_use]
    pub fn fallbacks(&self) -> usize {
        self.conversations.iter().map(|c| c.fallbacks).sum()
    }
}

/// Counters accumulated over the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    /// Ticks executed.
    pub ticks: u64,
    /// Conversations held, lessons included.
    pub conversations: usize,
    /// Conversations that were lessons.
    pub lessons: usize,
    /// Fallback lines.
    pub fallbacks: usize,
    /// Refused moves.
    pub rejected_moves: usize,
    /// Agent-ticks skipped after a failed decision.
    pub skipped: usize,
    /// Auto-saves that failed twice.
    pub failed_saves: usize,
}

/// End-of-run report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Run counters.
    pub totals: RunTotals,
    /// Memory overview per agent.
    pub agents: BTreeMap<AgentId, MemorySummary>,
    /// Where everyone ended up.
    pub final_locations: BTreeMap<AgentId, LocationKey>,
    /// Knowledge probe before the first tick.
    pub pre_probe: ProbeReport,
    /// Knowledge probe after the last tick.
    pub post_probe: ProbeReport,
    /// Per agent and topic, pre against post.
    pub knowledge: Vec<KnowledgeChange>,
}

/// Moves sorted into accepted and refused.
#[derive(Debug, Default)]
struct AppliedIntents {
    moves: Vec<MoveRecord>,
    rejected: Vec<RejectedMove>,
    arrived: Vec<(AgentId, Activity, LocationKey)>,
}

/// Runs the town.
#[derive(Debug)]
pub struct SimulationDriver<G> {
    config: TownConfig,
    world: WorldState,
    registry: PersonaRegistry,
    agents: BTreeMap<AgentId, Agent>,
    generator: Arc<G>,
    state: DriverState,
    snapshot: Option<SnapshotDb>,
    totals: RunTotals,
}

impl SimulationDriver<ConfiguredGenerator> {
    /// Build a driver with the generator named in `[llm]`.
    ///
    /// # Errors
    /// As [`SimulationDriver::new`], plus [`SimError::Llm`] for an unusable
    /// `[llm]` section.
    pub fn from_config(config: TownConfig) -> Result<Self> {
        let generator = ConfiguredGenerator::from_config(&config.llm)?;
        Self::new(config, generator)
    }
}

impl<G: TextGenerator + 'static> SimulationDriver<G> {
    /// Validate the configuration, build the world and place every agent.
    ///
    /// # Errors
    /// [`SimError::Config`] or [`SimError::Core`] for an invalid configuration.
    pub fn new(config: TownConfig, generator: G) -> Result<Self> {
        config.validate()?;

        let map = LocationMap::new(config.locations.iter().map(|spec| {
            (
                LocationKey::new(spec.key.clone()),
                LocationInfo {
                    description: spec.description.clone(),
                    function: spec.function.clone(),
                    social: spec.social,
                },
            )
        }))?;
        let world = WorldState::new(map);
        let locations = Arc::clone(world.locations());
        let registry = PersonaRegistry::from_configs(&config.personas)?;
        let class_location = LocationKey::new(config.simulation.class_location.clone());

        let mut agents = BTreeMap::new();
        for (id, persona) in registry.iter() {
            let initial = persona.initial_location.as_ref().map(|key| LocationKey::new(key.clone()));
            let home = world.place_agent(id, initial.as_ref())?;
            let memory = MemoryStore::new(id.clone(), Arc::clone(&locations), &config.memory, &config.retrieval);
            let agent = Agent::new(Arc::clone(persona), memory, class_location.clone(), home);
            agents.insert(id.clone(), agent);
        }

        info!(
            agents = agents.len(),
            locations = locations.len(),
            days = config.simulation.days,
            periods = config.simulation.periods_per_day(),
            backend = generator.backend(),
            "Simulation ready"
        );

        Ok(Self {
            config,
            world,
            registry,
            agents,
            generator: Arc::new(generator),
            state: DriverState::NotStarted,
            snapshot: None,
            totals: RunTotals::default(),
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// The configuration the run was built from.
    #[must_use]
    pub fn config(&self) -> &TownConfig {
        &self.config
    }

    /// The world.
    #[must_use]
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// The persona registry.
    #[must_use]
    pub fn registry(&self) -> &PersonaRegistry {
        &self.registry
    }

    /// One agent.
    #[must_use]
    pub fn agent(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Every agent in id order.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// Counters so far.
    #[must_use]
    pub fn totals(&self) -> RunTotals {
        self.totals
    }

    /// The shared generator.
    #[must_use]
    pub fn generator(&self) -> &Arc<G> {
        &self.generator
    }

    /// Load every agent's saved memories from the configured backend.
    ///
    /// Agents without a saved document keep their empty store. Returns the
    /// number of stores restored.
    ///
    /// # Errors
    /// [`SimError::Config`] after the first tick; persistence errors for
    /// unreadable or mismatched documents.
    pub fn restore_memories(&mut self) -> Result<usize> {
        if self.state != DriverState::NotStarted {
            return Err(SimError::Config("memories can only be restored before the first tick".into()));
        }
        if self.config.persistence.backend == PersistenceBackend::Sqlite {
            self.open_snapshot()?;
        }

        let locations = Arc::clone(self.world.locations());
        let settings = &self.config.persistence;
        let mut restored = 0;
        for (id, agent) in &mut self.agents {
            let store = match settings.backend {
                PersistenceBackend::Json => {
                    let path = persistence::document_path(&settings.directory, id);
                    let outcome = MemoryStore::load(
                        &path,
                        id.clone(),
                        Arc::clone(&locations),
                        &self.config.memory,
                        &self.config.retrieval,
                    )?;
                    outcome.is_loaded().then(|| outcome.into_store())
                }
                PersistenceBackend::Sqlite => {
                    let Some(db) = self.snapshot.as_ref() else {
                        continue;
                    };
                    match db.load_document(id)? {
                        Some(document) if &document.owner == id => Some(MemoryStore::from_document(
                            document,
                            Arc::clone(&locations),
                            &self.config.memory,
                            &self.config.retrieval,
                        )?),
                        Some(document) => {
                            return Err(SimError::Config(format!(
                                "snapshot for '{id}' belongs to '{}'",
                                document.owner
                            )));
                        }
                        None => None,
                    }
                }
            };
            if let Some(store) = store {
                agent.replace_memory(store)?;
                restored += 1;
            }
        }
        info!(restored, agents = self.agents.len(), "Memories restored");
        Ok(restored)
    }

    /// Save every agent's memory store to the configured backend.
    ///
    /// # Errors
    /// The first persistence error encountered.
    pub fn save_all(&mut self) -> Result<usize> {
        match self.config.persistence.backend {
            PersistenceBackend::Json => {
                let directory = &self.config.persistence.directory;
                for (id, agent) in &self.agents {
                    agent.memory().save(persistence::document_path(directory, id))?;
                }
            }
            PersistenceBackend::Sqlite => {
                self.open_snapshot()?;
                if let Some(db) = self.snapshot.as_ref() {
                    for agent in self.agents.values() {
                        db.save_document(&agent.memory().to_document())?;
                    }
                }
            }
        }
        debug!(agents = self.agents.len(), "All memory stores saved");
        Ok(self.agents.len())
    }

    fn open_snapshot(&mut self) -> Result<()> {
        if self.snapshot.is_none() {
            let settings = &self.config.persistence;
            self.snapshot = Some(SnapshotDb::open(&settings.database, settings)?);
        }
        Ok(())
    }

    /// Run one tick.
    ///
    /// # Errors
    /// [`SimError::AlreadyFinished`] after the last tick; memory errors
    /// while recording outcomes; [`SimError::Task`] if a conversation task
    /// panicked.
    pub async fn step(&mut self) -> Result<TickReport> {
        let (day, period) = match self.state {
            DriverState::NotStarted => (1, 0),
            DriverState::Running { day, period } => (day, period),
            DriverState::Finished => return Err(SimError::AlreadyFinished),
        };
        let spec = usize::try_from(period)
            .ok()
            .and_then(|idx| self.config.simulation.periods.get(idx))
            .cloned()
            .ok_or_else(|| SimError::Config(format!("period {period} is not configured")))?;
        let now = SimTime::new(day, period, self.config.simulation.periods_per_day());

        let span = info_span!("tick", day, period = %spec.name, tick = now.tick);
        let report = self.run_tick(now, &spec).instrument(span).await?;

        self.state = self.next_state(day, period);
        self.totals.ticks += 1;
        self.totals.conversations += report.conversations.len();
        self.totals.lessons += report
            .conversations
            .iter()
            .filter(|c| c.kind == ConversationKind::Lesson)
            .count();
        self.totals.fallbacks += report.fallbacks();
        self.totals.rejected_moves += report.rejected_moves.len();
        self.totals.skipped += report.skipped.len();
        if matches!(report.save, SaveStatus::Failed { .. }) {
            self.totals.failed_saves += 1;
        }
        Ok(report)
    }

    /// Run every remaining tick, probing knowledge before and after.
    ///
    /// # Errors
    /// [`SimError::AlreadyFinished`] if the run is over; otherwise as [`Self::step`].
    pub async fn run(&mut self) -> Result<RunSummary> {
        if self.state == DriverState::Finished {
            return Err(SimError::AlreadyFinished);
        }
        let topics = self.topics();
        let pre_probe = exam::probe("pre", self.agents.values_mut(), &topics);

        while self.state != DriverState::Finished {
            self.step().await?;
        }

        let post_probe = exam::probe("post", self.agents.values_mut(), &topics);
        let knowledge = pre_probe.compare(&post_probe);
        let summary = RunSummary {
            totals: self.totals,
            agents: self
                .agents
                .iter()
                .map(|(id, agent)| (id.clone(), agent.memory().summary()))
                .collect(),
            final_locations: self
                .agents
                .keys()
                .filter_map(|id| self.world.location_of(id).map(|at| (id.clone(), at)))
                .collect(),
            pre_probe,
            post_probe,
            knowledge,
        };
        info!(
            ticks = summary.totals.ticks,
            conversations = summary.totals.conversations,
            lessons = summary.totals.lessons,
            fallbacks = summary.totals.fallbacks,
            "Simulation finished"
        );
        Ok(summary)
    }

    async fn run_tick(&mut self, now: SimTime, spec: &PeriodSpec) -> Result<TickReport> {
        let sim = &self.config.simulation;
        let locations = Arc::clone(self.world.locations());

        let mut intents = Vec::with_capacity(self.agents.len());
        let mut skipped = BTreeSet::new();
        for agent in self.agents.values_mut() {
            match agent.decide(now, spec, &locations, sim.redirect_importance) {
                Ok(intent) => intents.push(intent),
                Err(e) => {
                    warn!(agent = %agent.id(), error = %e, "Agent skipped this tick");
                    skipped.insert(agent.id().clone());
                }
            }
        }

        let applied = apply_intents(&self.world, intents);
        for (id, activity, location) in &applied.arrived {
            if let Some(agent) = self.agents.get_mut(id) {
                agent.remember_activity(*activity, location, spec, sim.activity_importance)?;
            }
        }

        let groups = conversation::form_groups(&self.world, &self.registry, &skipped);
        let plans: Vec<ConversationPlan> = groups
            .into_iter()
            .map(|group| self.plan_conversation(group, now, spec))
            .collect();

        let mut tasks = JoinSet::new();
        for (index, plan) in plans.into_iter().enumerate() {
            let generator = Arc::clone(&self.generator);
            tasks.spawn(async move { (index, conversation::hold(generator, plan).await) });
        }
        let mut transcripts: Vec<(usize, Transcript)> = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            transcripts.push(joined?);
        }
        transcripts.sort_by_key(|(index, _)| *index);

        let mut conversations = Vec::with_capacity(transcripts.len());
        for (_, transcript) in &transcripts {
            for (id, draft) in conversation::perspective_drafts(transcript, &self.config.simulation) {
                if let Some(agent) = self.agents.get_mut(&id) {
                    agent.remember_conversation(draft, self.config.simulation.recurring_chat_boost)?;
                }
            }
            let group = &transcript.plan.group;
            if transcript.fallback_count() > 0 {
                warn!(
                    location = %group.location,
                    fallbacks = transcript.fallback_count(),
                    "Conversation used fallback lines"
                );
            }
            conversations.push(ConversationReport {
                location: group.location.clone(),
                kind: group.kind(),
                participants: group.participants.clone(),
                topic: transcript.plan.topic.clone(),
                turns: transcript.turns.len(),
                fallbacks: transcript.fallback_count(),
            });
        }

        let save = if self.is_save_tick(now) {
            self.auto_save()
        } else {
            SaveStatus::NotDue
        };

        debug!(
            moves = applied.moves.len(),
            rejected = applied.rejected.len(),
            skipped = skipped.len(),
            conversations = conversations.len(),
            "Tick complete"
        );
        Ok(TickReport {
            time: now,
            period: spec.name.clone(),
            moves: applied.moves,
            rejected_moves: applied.rejected,
            skipped: skipped.into_iter().collect(),
            conversations,
            save,
        })
    }

    /// Read everything the conversation needs from the participants' memories.
    fn plan_conversation(&mut self, group: ConversationGroup, now: SimTime, spec: &PeriodSpec) -> ConversationPlan {
        let lesson = group.kind() == ConversationKind::Lesson;
        let teacher = group.expert.clone().or_else(|| self.registry.expert().cloned());
        let topic = teacher
            .as_ref()
            .and_then(|id| self.agents.get(id))
            .and_then(Agent::knowledge)
            .and_then(|kb| kb.topic_for_day(now.day).map(|topic| (kb, topic)));
        let (topic_name, fact) = match topic {
            Some((kb, topic)) => {
                let n = usize::try_from(now.period).unwrap_or(0);
                (topic.name.clone(), if lesson { kb.fact(topic, n) } else { None })
            }
            None => ("today's class".to_string(), None),
        };

        let mut order = group.participants.clone();
        if let Some(expert) = &group.expert {
            order.retain(|id| id != expert);
            order.insert(0, expert.clone());
        }
        let recall = self.config.memory.recall_context;
        let speakers = order
            .iter()
            .filter_map(|id| {
                let agent = self.agents.get_mut(id)?;
                let memories = format_memories(&agent.recent_context(recall));
                Some(Speaker {
                    id: id.clone(),
                    name: agent.name().to_string(),
                    system_prompt: agent.system_prompt(lesson),
                    memories,
                })
            })
            .collect();

        let llm = &self.config.llm;
        let location_description = self
            .world
            .locations()
            .get(group.location.as_str())
            .map(|info| info.description.clone())
            .unwrap_or_default();
        ConversationPlan {
            topic: topic_name,
            fact,
            time_label: format!("{now} ({})", spec.name),
            location_description,
            speakers,
            rounds: self.config.simulation.max_dialogue_rounds,
            request_defaults: GenerationRequest::new("", "")
                .with_max_tokens(llm.max_tokens)
                .with_temperature(llm.temperature)
                .with_timeout(llm.timeout_ms),
            group,
        }
    }

    fn is_save_tick(&self, now: SimTime) -> bool {
        let every = self.config.persistence.auto_save_every_days;
        every > 0 && now.period + 1 == self.config.simulation.periods_per_day() && now.day % every == 0
    }

    /// Save, retry once, then give up with a warning.
    fn auto_save(&mut self) -> SaveStatus {
        match self.save_all() {
            Ok(agents) => SaveStatus::Saved { agents },
            Err(first) => {
                warn!(error = %first, "Auto-save failed, retrying once");
                match self.save_all() {
                    Ok(agents) => SaveStatus::Saved { agents },
                    Err(e) => {
                        warn!(error = %e, "Auto-save failed again, continuing in memory");
                        SaveStatus::Failed { error: e.to_string() }
                    }
                }
            }
        }
    }

    fn next_state(&self, day: u32, period: u32) -> DriverState {
        if period + 1 < self.config.simulation.periods_per_day() {
            DriverState::Running { day, period: period + 1 }
        } else if day < self.config.simulation.days {
            DriverState::Running { day: day + 1, period: 0 }
        } else {
            DriverState::Finished
        }
    }

    /// Topics the expert teaches.
    fn topics(&self) -> Vec<String> {
        self.registry
            .expert()
            .and_then(|id| self.agents.get(id))
            .and_then(Agent::knowledge)
            .map(|kb| kb.topic_names().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Apply every intent through the world. A refused move leaves the agent
/// where it was and records no activity.
fn apply_intents(world: &WorldState, intents: Vec<Intent>) -> AppliedIntents {
    let mut applied = AppliedIntents::default();
    for intent in intents {
        match world.move_agent(&intent.agent, &intent.destination) {
            Ok(from) => {
                applied.moves.push(MoveRecord {
                    agent: intent.agent.clone(),
                    from,
                    to: intent.destination.clone(),
                    activity: intent.activity.to_string(),
                    prompted_by: intent.prompted_by,
                });
                applied.arrived.push((intent.agent, intent.activity, intent.destination));
            }
            Err(e) => {
                warn!(agent = %intent.agent, destination = %intent.destination, error = %e, "Move rejected");
                applied.rejected.push(RejectedMove {
                    agent: intent.agent,
                    destination: intent.destination,
                    reason: e.to_string(),
                });
            }
        }
    }
    applied
}
