//! Error types for sieve.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias using sieve's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for sieve operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Source id is unknown to the store
    #[error("Source not found: {0}")]
    NoSuchSource(String),

    /// Source exists but has no stored descriptors
    #[error("No items to analyze for source: {0}")]
    NoItemsToAnalyze(String),

    /// The generation transport failed.
    ///
    /// `retry_after` is set only when the transport reported rate limiting.
    #[error("Generation transport error: {message}")]
    GenerationTransport {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Generator output could not be turned into the expected structure,
    /// even after repair.
    #[error("Response parse error: no usable JSON in {} bytes of output", raw_text.len())]
    ResponseParse { raw_text: String },

    /// Profile not found
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// A generation job is already running for the scope.
    ///
    /// `start` reports a duplicate as `StartOutcome::AlreadyRunning` rather
    /// than failing; this variant gives callers that need an error (and the
    /// HTTP status mapping) the same condition.
    #[error("Generation already running for scope: {0}")]
    JobAlreadyRunning(String),

    /// New generation is blocked until the resume timestamp
    #[error("Rate limited until {resume_at}")]
    RateLimited { resume_at: DateTime<Utc> },

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a plain transport failure (no rate-limit signal).
    pub fn transport(message: impl Into<String>) -> Self {
        Error::GenerationTransport {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Build a rate-limited transport failure.
    pub fn rate_limited(message: impl Into<String>, retry_after: Duration) -> Self {
        Error::GenerationTransport {
            message: message.into(),
            retry_after: Some(retry_after),
        }
    }

    /// The retry-after duration, when this is a rate-limit signal.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::GenerationTransport { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
