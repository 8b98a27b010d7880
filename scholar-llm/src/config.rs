//! `[llm]` configuration section.

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Which backend produces text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Ollama's `/api/generate`.
    Ollama,
    /// Any `/v1/chat/completions` endpoint.
    #[serde(alias = "openai")]
    OpenAiCompatible,
    /// Canned replies, no network.
    #[default]
    Scripted,
    /// Every call fails; the simulation runs on templates alone.
    None,
}

/// Text generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend.
    #[serde(default)]
    pub provider: ProviderKind,
    /// Base URL of the HTTP backend.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name sent to the backend.
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key (OpenAI-compatible only).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first failed attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Token limit per request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Seed for the scripted backend.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            seed: default_seed(),
        }
    }
}

impl LlmConfig {
    /// Check the section for values no backend could use.
    ///
    /// # Errors
    /// [`LlmError::ConfigError`] naming the problem.
    pub fn validate(&self) -> Result<(), LlmError> {
        if matches!(self.provider, ProviderKind::Ollama | ProviderKind::OpenAiCompatible) {
            if self.base_url.trim().is_empty() {
                return Err(LlmError::ConfigError("llm.base_url must not be empty".into()));
            }
            if self.model.trim().is_empty() {
                return Err(LlmError::ConfigError("llm.model must not be empty".into()));
            }
        }
        if self.timeout_ms == 0 {
            return Err(LlmError::ConfigError("llm.timeout_ms must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(LlmError::ConfigError(format!(
                "llm.temperature {} is outside 0.0..=2.0",
                self.temperature
            )));
        }
        Ok(())
    }
}

fn default_base_url() -> String { "http://localhost:11434".into() }
fn default_model() -> String { "qwen2.5:3b".into() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".into() }
fn default_timeout_ms() -> u64 { 10_000 }
fn default_max_retries() -> u32 { 2 }
fn default_max_tokens() -> u32 { 150 }
fn default_temperature() -> f32 { 0.7 }
fn default_seed() -> u64 { 42 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_section() {
        let config: LlmConfig = toml::from_str("provider = \"openai\"\nmodel = \"gpt-4o-mini\"").expect("parse");
        assert_eq!(config.provider, ProviderKind::OpenAiCompatible);
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_retries, 2);
        config.validate().expect("valid");
    }

    #[test]
    fn rejects_empty_url_for_http_backends() {
        let config = LlmConfig {
            provider: ProviderKind::Ollama,
            base_url: String::new(),
            ..LlmConfig::default()
        };
        assert!(matches!(config.validate(), Err(LlmError::ConfigError(_))));
    }
}
