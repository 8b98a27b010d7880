//! Simulation error types.

use scholar_core::{AgentId, CoreError};
use scholar_llm::LlmError;
use thiserror::Error;

/// Errors raised while configuring or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid `scholar.toml` content.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An agent could not decide what to do this tick.
    #[error("Agent {agent} could not decide: {reason}")]
    Decision {
        /// The agent that failed.
        agent: AgentId,
        /// Why.
        reason: String,
    },

    /// Memory or world failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Text generation failure that could not be recovered locally.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// A conversation task panicked or was cancelled.
    #[error("Conversation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The run has already reached its last tick.
    #[error("Simulation already finished")]
    AlreadyFinished,

    /// Logging could not be set up.
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, SimError>;
