//! Per-agent memory: records and the two-tier store that owns them.
//!
//! New memories always enter the short-term buffer. When the buffer grows
//! past its capacity the oldest record is demoted to the long-term archive;
//! nothing is ever deleted.

pub mod record;
pub mod store;

pub use record::{MemoryDraft, MemoryRecord};
pub use store::{LoadOutcome, MemoryStore, MemorySummary};
