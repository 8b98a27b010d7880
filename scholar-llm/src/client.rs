//! HTTP client for Ollama and OpenAI-compatible backends.

use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::{LlmConfig, ProviderKind};
use crate::error::LlmError;
use crate::scripted::ScriptedGenerator;
use crate::types::{GenerationRequest, GenerationResponse};
use crate::TextGenerator;

/// Provider backend for HTTP inference.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally.
    Ollama {
        /// e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible API.
    OpenAiCompatible {
        /// e.g. `https://api.openai.com`.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No backend; all calls fail so callers fall back to templates.
    None,
}

/// Routes requests to the configured HTTP backend with retries.
#[derive(Debug, Clone)]
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    model: String,
    max_retries: u32,
}

impl LlmClient {
    /// Create a new client.
    #[must_use]
    pub fn new(provider: LlmProvider, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_retries,
        }
    }

    /// A client with no backend.
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, String::new(), 0)
    }

    /// Whether a backend is configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    /// Send `request`, retrying up to `max_retries` times.
    ///
    /// # Errors
    /// [`LlmError::Unavailable`] without a backend, [`LlmError::ParseError`]
    /// for unreadable bodies, [`LlmError::Timeout`] when every attempt timed
    /// out, [`LlmError::RetriesExhausted`] otherwise.
    pub async fn complete(&self, request: &GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let backend = match &self.provider {
            LlmProvider::None => {
                return Err(LlmError::Unavailable("No LLM provider configured".into()));
            }
            LlmProvider::Ollama { .. } => "Ollama",
            LlmProvider::OpenAiCompatible { .. } => "OpenAI",
        };

        let attempts = self.max_retries + 1;
        let mut timeouts = 0;
        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(
                    backend,
                    attempt = attempt + 1,
                    of = self.max_retries + 1,
                    "Retrying LLM call"
                );
            }

            let Some(builder) = self.build(request) else {
                return Err(LlmError::Unavailable("No LLM provider configured".into()));
            };
            let start = Instant::now();
            let result = builder
                .timeout(Duration::from_millis(request.timeout_ms))
                .send()
                .await;
            let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let body: Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    let (text, tokens) = self.extract(&body)?;
                    return Ok(GenerationResponse {
                        text,
                        tokens_generated: tokens,
                        latency_ms,
                        model: self.model.clone(),
                    });
                }
                Ok(resp) => {
                    last_error = format!("HTTP {}", resp.status());
                    warn!(backend, error = %last_error, "LLM backend returned error");
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() {
                        timeouts += 1;
                        warn!(backend, timeout_ms = request.timeout_ms, "LLM request timed out");
                    } else {
                        warn!(backend, error = %last_error, "LLM request failed");
                    }
                }
            }
        }

        if timeouts == attempts {
            return Err(LlmError::Timeout(request.timeout_ms));
        }
        Err(LlmError::RetriesExhausted { attempts, last_error })
    }

    fn build(&self, request: &GenerationRequest) -> Option<RequestBuilder> {
        match &self.provider {
            LlmProvider::None => None,
            LlmProvider::Ollama { base_url } => {
                let body = json!({
                    "model": self.model,
                    "prompt": format!("{}\n\n{}", request.system, request.user),
                    "stream": false,
                    "options": {
                        "temperature": request.temperature,
                        "num_predict": request.max_tokens,
                    }
                });
                Some(self.http.post(format!("{base_url}/api/generate")).json(&body))
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let body = json!({
                    "model": self.model,
                    "messages": [
                        { "role": "system", "content": request.system },
                        { "role": "user", "content": request.user },
                    ],
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                });
                Some(
                    self.http
                        .post(format!("{base_url}/v1/chat/completions"))
                        .bearer_auth(api_key)
                        .json(&body),
                )
            }
        }
    }

    fn extract(&self, body: &Value) -> Result<(String, u32), LlmError> {
        let (text, tokens) = match self.provider {
            LlmProvider::Ollama { .. } => (body["response"].as_str(), body["eval_count"].as_u64()),
            LlmProvider::OpenAiCompatible { .. } => (
                body["choices"][0]["message"]["content"].as_str(),
                body["usage"]["completion_tokens"].as_u64(),
            ),
            LlmProvider::None => (None, None),
        };
        let text = text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| LlmError::ParseError(format!("no text in response: {body}")))?;
        let tokens = tokens.and_then(|t| u32::try_from(t).ok()).unwrap_or(0);
        Ok((text.to_string(), tokens))
    }
}

impl TextGenerator for LlmClient {
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<GenerationResponse, LlmError>> + Send {
        self.complete(request)
    }

    fn backend(&self) -> &str {
        match self.provider {
            LlmProvider::Ollama { .. } => "ollama",
            LlmProvider::OpenAiCompatible { .. } => "openai",
            LlmProvider::None => "none",
        }
    }
}

/// The generator selected by an `[llm]` section.
#[derive(Debug)]
pub enum ConfiguredGenerator {
    /// An HTTP backend (or the `None` provider).
    Http(LlmClient),
    /// Offline canned replies.
    Scripted(ScriptedGenerator),
}

impl ConfiguredGenerator {
    /// Build the backend named by `config`.
    ///
    /// # Errors
    /// [`LlmError::ConfigError`] for an invalid section or a missing API key.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        config.validate()?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let generator = match config.provider {
            ProviderKind::Scripted => Self::Scripted(ScriptedGenerator::new(config.seed)),
            ProviderKind::None => Self::Http(LlmClient::none()),
            ProviderKind::Ollama => Self::Http(LlmClient::new(
                LlmProvider::Ollama { base_url },
                &config.model,
                config.max_retries,
            )),
            ProviderKind::OpenAiCompatible => {
                let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                    LlmError::ConfigError(format!("environment variable {} is not set", config.api_key_env))
                })?;
                Self::Http(LlmClient::new(
                    LlmProvider::OpenAiCompatible { base_url, api_key },
                    &config.model,
                    config.max_retries,
                ))
            }
        };
        Ok(generator)
    }
}

impl TextGenerator for ConfiguredGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, LlmError> {
        match self {
            Self::Http(client) => client.complete(request).await,
            Self::Scripted(scripted) => scripted.generate(request).await,
        }
    }

    fn backend(&self) -> &str {
        match self {
            Self::Http(client) => client.backend(),
            Self::Scripted(scripted) => scripted.backend(),
        }
    }
}
