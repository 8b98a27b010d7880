//! Offline generator with canned, seeded replies.
//!
//! The reply for a request depends only on the seed and the request text,
//! never on call order, so concurrent calls stay reproducible.

use std::collections::VecDeque;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::LlmError;
use crate::prompt::{render_template, scenario_topic};
use crate::types::{GenerationRequest, GenerationResponse};
use crate::TextGenerator;

/// Requests kept for inspection; older ones are dropped.
pub const REQUEST_LOG_CAPACITY: usize = 64;

const REPLIES: &[&str] = &[
    "I have been thinking about {topic} since this morning.",
    "Could you explain the part about {topic} once more?",
    "That reminds me of what we covered on {topic} last time.",
    "I think I finally understand {topic} now.",
    "Let's compare notes on {topic} later in the library.",
    "Honestly, {topic} is harder than it looks.",
];

/// Deterministic stand-in for a language model.
#[derive(Debug)]
pub struct ScriptedGenerator {
    seed: u64,
    latency: Duration,
    failing: bool,
    requests: Mutex<VecDeque<GenerationRequest>>,
}

impl ScriptedGenerator {
    /// A generator drawing replies from the built-in script.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            latency: Duration::ZERO,
            failing: false,
            requests: Mutex::new(VecDeque::with_capacity(REQUEST_LOG_CAPACITY)),
        }
    }

    /// A generator whose every call fails with [`LlmError::Unavailable`].
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new(0)
        }
    }

    /// Sleep this long before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The last [`REQUEST_LOG_CAPACITY`] requests, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().iter().cloned().collect()
    }

    fn reply_for(&self, request: &GenerationRequest) -> String {
        let mut hasher = DefaultHasher::new();
        request.system.hash(&mut hasher);
        request.user.hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(self.seed ^ hasher.finish());

        let topic = scenario_topic(&request.user).unwrap_or("today's class");
        let line = REPLIES.choose(&mut rng).copied().unwrap_or(REPLIES[0]);
        render_template(line, &[("topic", topic)])
    }
}

impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, LlmError> {
        {
            let mut log = self.requests.lock();
            if log.len() == REQUEST_LOG_CAPACITY {
                log.pop_front();
            }
            log.push_back(request.clone());
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing {
            return Err(LlmError::Unavailable("scripted generator set to fail".into()));
        }
        let text = self.reply_for(request);
        let tokens = u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX);
        Ok(GenerationResponse {
            text,
            tokens_generated: tokens,
            latency_ms: u64::try_from(self.latency.as_millis()).unwrap_or(u64::MAX),
            model: "scripted".into(),
        })
    }

    fn backend(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_request_same_reply() {
        let a = ScriptedGenerator::new(7);
        let b = ScriptedGenerator::new(7);
        let request = GenerationRequest::new("You are Ana.", "Topic: calculus\nSay something.");
        let first = a.generate(&request).await.expect("reply");
        let second = b.generate(&request).await.expect("reply");
        assert_eq!(first.text, second.text);
        assert!(first.text.contains("calculus"));
        assert_eq!(a.requests().len(), 1);
    }

    #[tokio::test]
    async fn failing_generator_records_then_fails() {
        let generator = ScriptedGenerator::failing();
        let result = generator.generate(&GenerationRequest::new("s", "u")).await;
        assert!(matches!(result, Err(LlmError::Unavailable(_))));
        assert_eq!(generator.requests().len(), 1);
    }

    #[tokio::test]
    async fn request_log_keeps_only_the_latest() {
        let generator = ScriptedGenerator::new(1);
        for i in 0..REQUEST_LOG_CAPACITY + 10 {
            generator
                .generate(&GenerationRequest::new("s", format!("call {i}")))
                .await
                .expect("reply");
        }
        let log = generator.requests();
        assert_eq!(log.len(), REQUEST_LOG_CAPACITY);
        assert_eq!(log[0].user, "call 10");
        assert_eq!(log[REQUEST_LOG_CAPACITY - 1].user, format!("call {}", REQUEST_LOG_CAPACITY + 9));
    }
}
