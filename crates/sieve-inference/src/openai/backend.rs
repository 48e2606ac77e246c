//! OpenAI-compatible generation backend implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::{debug, info, warn};

use sieve_core::defaults::{GEN_BASE_URL, GEN_MODEL, GEN_TIMEOUT_SECS};
use sieve_core::{Error, GenerationBackend, GenerationRequest, PromptPart, Result};

use super::error::{retry_after_from_headers, to_sieve_error, OpenAIErrorCode};
use super::types::*;

/// Configuration for OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    /// Model to use for generation.
    pub gen_model: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Sampling temperature, when the endpoint should not use its default.
    pub temperature: Option<f32>,
    /// Skip TLS verification (for self-signed certs in local environments).
    pub skip_tls_verify: bool,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: GEN_BASE_URL.to_string(),
            api_key: None,
            gen_model: GEN_MODEL.to_string(),
            timeout_seconds: GEN_TIMEOUT_SECS,
            temperature: None,
            skip_tls_verify: false,
        }
    }
}

impl OpenAIConfig {
    /// Read configuration from `SIEVE_GEN_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("SIEVE_GEN_BASE_URL").unwrap_or_else(|_| GEN_BASE_URL.to_string()),
            api_key: std::env::var("SIEVE_GEN_API_KEY").ok().filter(|k| !k.is_empty()),
            gen_model: std::env::var("SIEVE_GEN_MODEL").unwrap_or_else(|_| GEN_MODEL.to_string()),
            timeout_seconds: std::env::var("SIEVE_GEN_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(GEN_TIMEOUT_SECS),
            temperature: std::env::var("SIEVE_GEN_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok()),
            skip_tls_verify: std::env::var("SIEVE_GEN_SKIP_TLS_VERIFY")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(false),
        }
    }
}

/// OpenAI-compatible generation backend.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    /// Create a new OpenAI backend with the given configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let mut client_builder =
            Client::builder().timeout(Duration::from_secs(config.timeout_seconds));

        if config.skip_tls_verify {
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        let client = client_builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            base_url = %config.base_url,
            model = %config.gen_model,
            "Initializing OpenAI backend"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    /// Get the current configuration.
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Build a request with authentication if configured.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }

    /// Translate a generation request into chat messages.
    fn to_chat_request(&self, request: &GenerationRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);

        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: MessageContent::Text(request.system.clone()),
            });
        }

        let content = match request.parts.as_slice() {
            [PromptPart::Text(text)] => MessageContent::Text(text.clone()),
            parts => MessageContent::Parts(parts.iter().map(to_content_part).collect()),
        };
        messages.push(ChatMessage {
            role: "user".to_string(),
            content,
        });

        ChatCompletionRequest {
            model: self.config.gen_model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: Some(request.max_output_tokens),
        }
    }
}

fn to_content_part(part: &PromptPart) -> ContentPart {
    match part {
        PromptPart::Text(text) => ContentPart::Text { text: text.clone() },
        PromptPart::ImageUrl(url) => ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.clone() },
        },
    }
}

#[async_trait]
impl GenerationBackend for OpenAIBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let start = Instant::now();
        let prompt_len = request.prompt_text().len();
        debug!(
            subsystem = "inference",
            component = "openai",
            op = "generate",
            model = %self.config.gen_model,
            prompt_len,
            image_count = request.image_count(),
            max_tokens = request.max_output_tokens,
            "Sending generation request"
        );

        let response = self
            .build_request("/chat/completions")
            .json(&self.to_chat_request(request))
            .send()
            .await
            .map_err(|e| Error::transport(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_from_headers(response.headers(), Utc::now());
            let body: OpenAIErrorResponse = response.json().await.unwrap_or(OpenAIErrorResponse {
                error: OpenAIError {
                    message: status.canonical_reason().unwrap_or("Unknown error").to_string(),
                    error_type: "unknown".to_string(),
                    code: None,
                },
            });
            let code = OpenAIErrorCode::from_response(status.as_u16(), &body.error.error_type);
            if code == OpenAIErrorCode::RateLimitExceeded {
                warn!(
                    subsystem = "inference",
                    component = "openai",
                    retry_after_secs = retry_after.as_secs(),
                    "Generation endpoint rate limited"
                );
            }
            return Err(to_sieve_error(
                code,
                &format!("OpenAI returned {}: {}", status, body.error.message),
                retry_after,
            ));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::transport(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "generate",
            response_len = content.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Generation complete"
        );
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.config.gen_model
    }
}
