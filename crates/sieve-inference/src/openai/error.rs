//! OpenAI-specific error handling.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;

use sieve_core::defaults::RATE_LIMIT_COOLDOWN_SECS;
use sieve_core::Error;

/// OpenAI-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    /// Invalid authentication credentials.
    AuthenticationError,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Model not found or not available.
    ModelNotFound,
    /// Request too large.
    ContextLengthExceeded,
    /// Server error.
    ServerError,
    /// Unknown error.
    Unknown,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) | (403, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

/// Convert an OpenAI failure into a sieve transport error.
///
/// Only [`OpenAIErrorCode::RateLimitExceeded`] carries `retry_after`.
pub fn to_sieve_error(code: OpenAIErrorCode, message: &str, retry_after: Duration) -> Error {
    match code {
        OpenAIErrorCode::AuthenticationError => {
            Error::transport(format!("Authentication failed: {}", message))
        }
        OpenAIErrorCode::RateLimitExceeded => {
            Error::rate_limited(format!("Rate limit exceeded: {}", message), retry_after)
        }
        OpenAIErrorCode::ModelNotFound => Error::transport(format!("Model not found: {}", message)),
        OpenAIErrorCode::ContextLengthExceeded => {
            Error::transport(format!("Context too long: {}", message))
        }
        OpenAIErrorCode::ServerError => Error::transport(format!("Server error: {}", message)),
        OpenAIErrorCode::Unknown => Error::transport(message.to_string()),
    }
}

/// Epoch values at or above this are milliseconds, below it seconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// How long to wait after a rate-limit response.
///
/// `Retry-After` (delta seconds) wins; otherwise `X-RateLimit-Reset` is read
/// as an epoch timestamp in milliseconds or seconds. With neither header
/// the default cooldown applies.
pub fn retry_after_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Duration {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    };

    if let Some(secs) = header("retry-after").and_then(|v| v.parse::<f64>().ok()) {
        if secs.is_finite() && secs >= 0.0 {
            return Duration::from_secs(secs.ceil().max(1.0) as u64);
        }
    }

    if let Some(reset) = header("x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok()) {
        let reset_ms = if reset >= EPOCH_MILLIS_THRESHOLD {
            reset
        } else {
            reset.saturating_mul(1000)
        };
        let wait_ms = reset_ms - now.timestamp_millis();
        return Duration::from_millis(wait_ms.max(1000) as u64);
    }

    Duration::from_secs(RATE_LIMIT_COOLDOWN_SECS)
}
