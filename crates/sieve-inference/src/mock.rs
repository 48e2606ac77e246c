//! Scripted generation backend for deterministic testing.
//!
//! Replies come from, in order: the script queue, the first prompt-substring
//! route that matches, then the default response. An optional gate holds
//! every call until released, which lets tests observe a job while it is
//! still running.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sieve_inference::mock::MockGenerationBackend;
//! use sieve_inference::GenerationClient;
//!
//! let mock = MockGenerationBackend::new()
//!     .with_route("Tags selected", r#"{"combinedConcept":"Quiet Craft"}"#)
//!     .with_default_response(r#"{"themes":["cozy"]}"#);
//! let client = GenerationClient::new(Arc::new(mock.clone()));
//! assert_eq!(mock.call_count(), 0);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use sieve_core::{Error, GenerationBackend, GenerationRequest, Result};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    /// Transport failure; `retry_after` marks it as rate limiting.
    Fail {
        message: String,
        retry_after: Option<Duration>,
    },
}

impl MockReply {
    pub fn text(s: impl Into<String>) -> Self {
        MockReply::Text(s.into())
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        MockReply::Fail {
            message: "Rate limit exceeded".to_string(),
            retry_after: Some(retry_after),
        }
    }

    fn into_result(self) -> Result<String> {
        match self {
            MockReply::Text(text) => Ok(text),
            MockReply::Fail {
                message,
                retry_after: Some(wait),
            } => Err(Error::rate_limited(message, wait)),
            MockReply::Fail { message, .. } => Err(Error::transport(message)),
        }
    }
}

#[derive(Debug, Clone)]
struct MockConfig {
    routes: Vec<(String, String)>,
    default_response: String,
    latency: Option<Duration>,
    gate: Option<Arc<Notify>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            default_response: "{}".to_string(),
            latency: None,
            gate: None,
        }
    }
}

/// Mock generation backend.
#[derive(Clone, Default)]
pub struct MockGenerationBackend {
    config: Arc<MockConfig>,
    script: Arc<Mutex<VecDeque<MockReply>>>,
    calls: Arc<Mutex<Vec<GenerationRequest>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockGenerationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies consumed one per call, before routes and default.
    pub fn with_script(self, replies: Vec<MockReply>) -> Self {
        lock(&self.script).extend(replies);
        self
    }

    /// Reply with `response` whenever the prompt text contains `needle`.
    pub fn with_route(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .routes
            .push((needle.into(), response.into()));
        self
    }

    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        Arc::make_mut(&mut self.config).latency = Some(latency);
        self
    }

    /// Hold every call until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        Arc::make_mut(&mut self.config).gate = Some(gate);
        self
    }

    /// Queue another reply after construction.
    pub fn push_reply(&self, reply: MockReply) {
        lock(&self.script).push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Every request seen so far, in call order.
    pub fn calls(&self) -> Vec<GenerationRequest> {
        lock(&self.calls).clone()
    }

    fn next_reply(&self, prompt: &str) -> MockReply {
        if let Some(reply) = lock(&self.script).pop_front() {
            return reply;
        }
        self.config
            .routes
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| MockReply::Text(response.clone()))
            .unwrap_or_else(|| MockReply::Text(self.config.default_response.clone()))
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        lock(&self.calls).push(request.clone());

        if let Some(gate) = &self.config.gate {
            gate.notified().await;
        }
        if let Some(latency) = self.config.latency {
            tokio::time::sleep(latency).await;
        }

        self.next_reply(&request.prompt_text()).into_result()
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
