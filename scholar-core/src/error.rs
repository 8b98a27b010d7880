//! Error types for the scholar core library.

use thiserror::Error;

use crate::types::{AgentId, LocationKey, MemoryId};

/// Top-level error type for all memory and world operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A memory referenced a location the world does not know about.
    #[error("Invalid location: '{0}' is not a known location")]
    InvalidLocation(LocationKey),

    /// An agent was asked to move to a location the world does not know about.
    #[error("Invalid destination for {agent}: '{destination}' is not a known location")]
    InvalidDestination {
        /// The agent that tried to move.
        agent: AgentId,
        /// The rejected destination key.
        destination: LocationKey,
    },

    /// The agent has never been placed in the world.
    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    /// Importance supplied at construction is outside the configured bounds.
    #[error("Invalid importance {value} (allowed range: {min}..={max})")]
    InvalidImportance {
        /// The rejected value.
        value: f32,
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },

    /// A memory with the given ID was not found in either tier.
    #[error("Memory not found: {0}")]
    NotFound(MemoryId),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether this error came from the persistence layer (file or database).
    ///
    /// Persistence failures are survivable: callers retry and then keep
    /// running on in-memory state.
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::Database(_) | Self::Io(_))
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, CoreError>;
