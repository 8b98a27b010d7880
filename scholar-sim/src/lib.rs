//! # scholar-sim: Classroom Town Simulation
//!
//! Drives a small population of agents (one expert, several students)
//! through simulated days. Every tick each agent picks where to go, the
//! world validates the move, co-located agents at social places talk, and
//! every participant remembers the conversation from its own perspective.
//!
//! ## Modules
//!
//! - `config`: `scholar.toml` sections, validated once at load
//! - `registry`: persona registry owned by the simulation
//! - `schedule` / `knowledge`: per-agent schedule and the expert's topics
//! - `agent`: one agent with its persona, memory store and decisions
//! - `conversation`: grouping, dialogue generation, perspective memories
//! - `driver`: the tick state machine
//! - `exam`: knowledge probe over learning/teaching memories
//! - `telemetry`: tracing subscriber setup

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod config;
pub mod conversation;
pub mod driver;
pub mod error;
pub mod exam;
pub mod knowledge;
pub mod registry;
pub mod schedule;
pub mod telemetry;

pub use agent::{Agent, Intent, Role};
pub use config::TownConfig;
pub use driver::{DriverState, RunSummary, SimulationDriver, TickReport};
pub use error::SimError;
