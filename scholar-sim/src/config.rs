//! Configuration for a simulation run.
//!
//! Maps directly to `scholar.toml`. Every section has defaults; the
//! defaults describe a small campus with one teacher and four students.
//! [`TownConfig::from_toml`] validates once, so the hot path never checks
//! configuration again.

use std::collections::HashSet;
use std::path::Path;

use scholar_core::config::{MemoryConfig, PersistenceConfig, RetrievalConfig};
use scholar_llm::LlmConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TownConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Per-agent memory capacity and importance bounds.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Search ranking.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Where memories are saved.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Days, periods and conversation settings.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Text generation backend.
    #[serde(default)]
    pub llm: LlmConfig,
    /// The campus map, in placement order.
    #[serde(default = "default_locations")]
    pub locations: Vec<LocationSpec>,
    /// Everyone who lives on campus.
    #[serde(default = "default_personas")]
    pub personas: Vec<PersonaConfig>,
}

impl Default for TownConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            memory: MemoryConfig::default(),
            retrieval: RetrievalConfig::default(),
            persistence: PersistenceConfig::default(),
            simulation: SimulationConfig::default(),
            llm: LlmConfig::default(),
            locations: default_locations(),
            personas: default_personas(),
        }
    }
}

impl TownConfig {
    /// Parse and validate a TOML string.
    ///
    /// # Errors
    /// [`SimError::Config`] if the TOML is malformed or fails validation.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| SimError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    ///
    /// # Errors
    /// [`SimError::Io`] if the file cannot be read, otherwise as [`Self::from_toml`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check every cross-section constraint.
    ///
    /// # Errors
    /// [`SimError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.memory.validate()?;
        self.retrieval.validate()?;
        self.llm.validate()?;
        self.simulation.validate()?;
        for (name, value) in [
            ("activity_importance", self.simulation.activity_importance),
            ("conversation_importance", self.simulation.conversation_importance),
            ("lesson_importance", self.simulation.lesson_importance),
        ] {
            if !self.memory.importance_in_bounds(value) {
                return Err(SimError::Config(format!(
                    "simulation.{name} {value} is outside the memory importance bounds {}..={}",
                    self.memory.importance_min, self.memory.importance_max
                )));
            }
        }

        if self.locations.is_empty() {
            return Err(SimError::Config("at least one [[locations]] entry is required".into()));
        }
        let mut keys = HashSet::new();
        for location in &self.locations {
            if location.key.trim().is_empty() {
                return Err(SimError::Config("location keys must not be blank".into()));
            }
            if !keys.insert(location.key.as_str()) {
                return Err(SimError::Config(format!("duplicate location '{}'", location.key)));
            }
        }
        let known = |key: &str, context: &str| -> Result<()> {
            if keys.contains(key) {
                Ok(())
            } else {
                Err(SimError::Config(format!("{context} refers to unknown location '{key}'")))
            }
        };
        known(self.simulation.class_location.as_str(), "simulation.class_location")?;

        let mut ids = HashSet::new();
        let mut experts = 0;
        for persona in &self.personas {
            if persona.id.trim().is_empty() {
                return Err(SimError::Config("persona ids must not be blank".into()));
            }
            if !ids.insert(persona.id.as_str()) {
                return Err(SimError::Config(format!("duplicate persona '{}'", persona.id)));
            }
            if persona.role == Role::Expert {
                experts += 1;
            }
            let context = format!("persona '{}'", persona.id);
            if let Some(initial) = &persona.initial_location {
                known(initial.as_str(), context.as_str())?;
            }
            for free in &persona.schedule.free {
                known(free.as_str(), context.as_str())?;
            }
            if let Some(rest) = &persona.schedule.rest {
                known(rest.as_str(), context.as_str())?;
            }
            if persona.role == Role::Student && !persona.knowledge.is_empty() {
                return Err(SimError::Config(format!(
                    "{context}: only the expert starts with a knowledge base"
                )));
            }
        }
        if experts != 1 {
            return Err(SimError::Config(format!(
                "exactly one expert persona is required, found {experts}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log filter (`trace`, `debug`, `info`, ... or a full directive);
    /// `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// What agents do during a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    /// Everyone goes to the class location.
    Class,
    /// Agents follow their free-time preferences.
    Free,
    /// Agents retire to their rest location.
    Rest,
}

/// One period of the simulated day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSpec {
    /// Display name, e.g. `morning_1`.
    pub name: String,
    /// Behavior during the period.
    pub kind: PeriodKind,
}

impl PeriodSpec {
    fn new(name: &str, kind: PeriodKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// Simulation loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of simulated days.
    #[serde(default = "default_days")]
    pub days: u32,
    /// The periods of every day, in order.
    #[serde(default = "default_periods")]
    pub periods: Vec<PeriodSpec>,
    /// Rounds of dialogue per conversation; every participant speaks once per round.
    #[serde(default = "default_rounds")]
    pub max_dialogue_rounds: u32,
    /// Where class periods take place.
    #[serde(default = "default_class_location")]
    pub class_location: String,
    /// Conversation memories at least this important pull an agent back
    /// to where they happened during free periods.
    #[serde(default = "default_redirect_importance")]
    pub redirect_importance: f32,
    /// Importance added to earlier chats each time the same partners talk again.
    #[serde(default = "default_recurring_chat_boost")]
    pub recurring_chat_boost: f32,
    /// Importance of routine activity memories.
    #[serde(default = "default_activity_importance")]
    pub activity_importance: f32,
    /// Importance of ordinary conversation memories.
    #[serde(default = "default_conversation_importance")]
    pub conversation_importance: f32,
    /// Importance of teaching and learning memories.
    #[serde(default = "default_lesson_importance")]
    pub lesson_importance: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            days: default_days(),
            periods: default_periods(),
            max_dialogue_rounds: default_rounds(),
            class_location: default_class_location(),
            redirect_importance: default_redirect_importance(),
            recurring_chat_boost: default_recurring_chat_boost(),
            activity_importance: default_activity_importance(),
            conversation_importance: default_conversation_importance(),
            lesson_importance: default_lesson_importance(),
        }
    }
}

impl SimulationConfig {
    /// Periods per simulated day.
    #[must_use]
    pub fn periods_per_day(&self) -> u32 {
        u32::try_from(self.periods.len()).unwrap_or(u32::MAX)
    }

    /// Check loop bounds and importance settings.
    ///
    /// # Errors
    /// [`SimError::Config`] for the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.days == 0 {
            return Err(SimError::Config("simulation.days must be at least 1".into()));
        }
        if self.periods.is_empty() {
            return Err(SimError::Config("simulation.periods must not be empty".into()));
        }
        if self.max_dialogue_rounds == 0 {
            return Err(SimError::Config("simulation.max_dialogue_rounds must be at least 1".into()));
        }
        for (name, value) in [
            ("redirect_importance", self.redirect_importance),
            ("recurring_chat_boost", self.recurring_chat_boost),
            ("activity_importance", self.activity_importance),
            ("conversation_importance", self.conversation_importance),
            ("lesson_importance", self.lesson_importance),
        ] {
            if !value.is_finite() {
                return Err(SimError::Config(format!("simulation.{name} must be finite")));
            }
        }
        if self.recurring_chat_boost < 0.0 {
            return Err(SimError::Config("simulation.recurring_chat_boost must not be negative".into()));
        }
        Ok(())
    }
}

/// One `[[locations]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSpec {
    /// Unique key.
    pub key: String,
    /// What the place looks like.
    #[serde(default)]
    pub description: String,
    /// What the place is for.
    #[serde(default)]
    pub function: String,
    /// Whether agents meeting here talk.
    #[serde(default = "default_true")]
    pub social: bool,
}

impl LocationSpec {
    fn new(key: &str, description: &str, function: &str, social: bool) -> Self {
        Self {
            key: key.to_string(),
            description: description.to_string(),
            function: function.to_string(),
            social,
        }
    }
}

/// Expert or student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Owns the knowledge base and teaches.
    Expert,
    /// Learns from the expert and from peers.
    Student,
}

/// Per-persona schedule preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePrefs {
    /// Locations for free periods, rotated through day by day.
    #[serde(default)]
    pub free: Vec<String>,
    /// Where the agent rests; defaults to its initial location.
    #[serde(default)]
    pub rest: Option<String>,
}

/// One topic of the expert's knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeSpec {
    /// Topic name, e.g. `calculus`.
    pub topic: String,
    /// Facts taught under this topic.
    #[serde(default)]
    pub facts: Vec<String>,
}

/// One `[[personas]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Unique agent id.
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Expert or student.
    pub role: Role,
    /// Personality description used in prompts.
    #[serde(default)]
    pub personality: String,
    /// How the agent talks.
    #[serde(default)]
    pub dialogue_style: String,
    /// What the agent is trying to achieve.
    #[serde(default)]
    pub goals: Vec<String>,
    /// Free and rest period preferences.
    #[serde(default)]
    pub schedule: SchedulePrefs,
    /// Starting location; the first location when absent.
    #[serde(default)]
    pub initial_location: Option<String>,
    /// Knowledge base (expert only).
    #[serde(default)]
    pub knowledge: Vec<KnowledgeSpec>,
}

impl PersonaConfig {
    /// The name used in prompts and memories.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".into() }
fn default_days() -> u32 { 5 }
fn default_rounds() -> u32 { 3 }
fn default_class_location() -> String { "classroom".into() }
fn default_redirect_importance() -> f32 { 0.65 }
fn default_recurring_chat_boost() -> f32 { 0.2 }
fn default_activity_importance() -> f32 { 0.2 }
fn default_conversation_importance() -> f32 { 0.5 }
fn default_lesson_importance() -> f32 { 0.8 }

fn default_periods() -> Vec<PeriodSpec> {
    vec![
        PeriodSpec::new("morning_1", PeriodKind::Class),
        PeriodSpec::new("morning_2", PeriodKind::Free),
        PeriodSpec::new("afternoon_1", PeriodKind::Class),
        PeriodSpec::new("afternoon_2", PeriodKind::Free),
        PeriodSpec::new("evening", PeriodKind::Rest),
    ]
}

fn default_locations() -> Vec<LocationSpec> {
    vec![
        LocationSpec::new("classroom", "Main teaching area with desks and a whiteboard", "lessons and classes", true),
        LocationSpec::new("library", "Quiet area with books and study materials", "independent study and research", false),
        LocationSpec::new("cafeteria", "Dining area for meals and socializing", "eating and casual conversations", true),
        LocationSpec::new("playground", "Outdoor area for physical activities", "recreation and exercise", true),
        LocationSpec::new("office", "Faculty desks and a small meeting table", "meetings and office hours", true),
        LocationSpec::new("dormitory", "Rooms where everyone sleeps", "rest", false),
    ]
}

fn default_personas() -> Vec<PersonaConfig> {
    let student = |id: &str, name: &str, free: &[&str]| PersonaConfig {
        id: id.to_string(),
        name: Some(name.to_string()),
        role: Role::Student,
        personality: "a student with a unique learning style and curiosity about the world".into(),
        dialogue_style: "inquiring and collaborative".into(),
        goals: vec!["understand the lessons".into(), "pass the final exam".into()],
        schedule: SchedulePrefs {
            free: free.iter().map(|s| (*s).to_string()).collect(),
            rest: Some("dormitory".into()),
        },
        initial_location: Some("dormitory".into()),
        knowledge: Vec::new(),
    };
    vec![
        PersonaConfig {
            id: "teacher".into(),
            name: Some("Professor Chen".into()),
            role: Role::Expert,
            personality: "a knowledgeable and patient educator who explains concepts clearly".into(),
            dialogue_style: "instructive and encouraging".into(),
            goals: vec!["help every student master the material".into()],
            schedule: SchedulePrefs {
                free: vec!["office".into()],
                rest: Some("office".into()),
            },
            initial_location: Some("office".into()),
            knowledge: vec![
                KnowledgeSpec {
                    topic: "algebra".into(),
                    facts: vec!["a linear equation has exactly one solution unless its coefficients vanish".into()],
                },
                KnowledgeSpec {
                    topic: "geometry".into(),
                    facts: vec!["the angles of a triangle sum to 180 degrees".into()],
                },
                KnowledgeSpec {
                    topic: "calculus".into(),
                    facts: vec!["the derivative measures the instantaneous rate of change".into()],
                },
            ],
        },
        student("student_1", "Lin", &["library", "cafeteria"]),
        student("student_2", "Mei", &["cafeteria", "playground"]),
        student("student_3", "Tao", &["playground", "library"]),
        student("student_4", "Yan", &["cafeteria", "office"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        TownConfig::default().validate().expect("default campus is valid");
        assert_eq!(TownConfig::default().simulation.periods_per_day(), 5);
    }

    #[test]
    fn empty_toml_uses_default_campus() {
        let config = TownConfig::from_toml("").expect("parse");
        assert_eq!(config.locations.len(), 6);
        assert_eq!(config.personas.len(), 5);
    }

    #[test]
    fn requires_exactly_one_expert() {
        let mut config = TownConfig::default();
        config.personas.retain(|p| p.role == Role::Student);
        assert!(matches!(config.validate(), Err(SimError::Config(msg)) if msg.contains("found 0")));
    }

    #[test]
    fn rejects_unknown_schedule_location() {
        let mut config = TownConfig::default();
        config.personas[1].schedule.free.push("moon".into());
        let err = config.validate().expect_err("unknown location");
        assert!(err.to_string().contains("moon"));
    }

    #[test]
    fn rejects_duplicate_locations_and_zero_days() {
        let mut config = TownConfig::default();
        config.locations.push(config.locations[0].clone());
        assert!(config.validate().is_err());

        let mut config = TownConfig::default();
        config.simulation.days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn memory_section_errors_surface() {
        let err = TownConfig::from_toml("[memory]\nshort_term_capacity = 0").expect_err("invalid");
        assert!(matches!(err, SimError::Core(_)));
    }
}
