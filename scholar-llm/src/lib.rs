//! # scholar-llm: Text Generation for the Scholar Town
//!
//! Every line of dialogue and every lesson in the simulation goes through
//! the [`TextGenerator`] trait. Backends:
//!   - **Ollama** (local)
//!   - **OpenAI-compatible API**
//!   - **Scripted** (canned, seeded replies for offline runs and tests)
//!   - **None** (every call fails, so callers use their templated fallback)
//!
//! Callers must treat generation as fallible and slow: a failure is never
//! fatal, and calls for independent conversations may run concurrently.

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod prompt;
pub mod scripted;
pub mod types;

use std::future::Future;

pub use client::{ConfiguredGenerator, LlmClient, LlmProvider};
pub use config::{LlmConfig, ProviderKind};
pub use error::LlmError;
pub use scripted::ScriptedGenerator;
pub use types::{GenerationRequest, GenerationResponse};

/// An opaque `prompt -> text` capability.
///
/// Implementations must be shareable across tasks; the returned future must
/// be `Send` so calls can be spawned on the tokio runtime.
pub trait TextGenerator: Send + Sync {
    /// Produce text for `request`.
    ///
    /// # Errors
    /// Any [`LlmError`]; callers recover with templated text.
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<GenerationResponse, LlmError>> + Send;

    /// Short backend name for logs.
    fn backend(&self) -> &str;
}
