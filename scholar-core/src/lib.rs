//! # Scholar Core Library
//!
//! Memory layer for the agents of a small classroom town.
//!
//! Every agent owns a [`MemoryStore`]: a bounded short-term buffer of its
//! most recent experiences backed by an unbounded long-term archive.
//!
//! - **Remember**: new experiences land at the tail of the short-term
//!   buffer; overflow demotes the oldest record into the archive, never
//!   deleting it.
//! - **Recall**: the most recent short-term records, newest first.
//! - **Search**: lexical matching across both tiers, ranked by
//!   importance, access frequency and recency.
//! - **Persist**: one JSON document per agent, written atomically.
//!
//! The [`world::WorldState`] is the single source of truth for which
//! locations exist and where every agent currently stands. A memory can
//! only be recorded at a location the world knows about.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod memory;
pub mod persistence;
pub mod retrieval;
pub mod types;
pub mod world;

pub use config::{MemoryConfig, RetrievalConfig};
pub use error::CoreError;
pub use memory::{LoadOutcome, MemoryDraft, MemoryRecord, MemoryStore, MemorySummary};
pub use types::*;
pub use world::{LocationInfo, LocationMap, WorldState};
