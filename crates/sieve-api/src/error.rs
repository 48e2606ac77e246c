//! HTTP error rendering.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use tracing::error;

use sieve_core::Error;

/// Error returned by handlers, rendered as `{"error": message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn rate_limited_until(resume_at: DateTime<Utc>) -> Self {
        ApiError::RateLimited {
            message: format!("Rate limited until {}", resume_at.to_rfc3339()),
            retry_after_secs: Some(seconds_until(resume_at)),
        }
    }
}

/// Whole seconds until `at`, rounded up, never zero.
pub(crate) fn seconds_until(at: DateTime<Utc>) -> u64 {
    let ms = (at - Utc::now()).num_milliseconds().max(0) as u64;
    ms.div_ceil(1000).max(1)
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(_) | Error::NoSuchSource(_) | Error::ProfileNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            Error::InvalidInput(_) => ApiError::BadRequest(err.to_string()),
            Error::JobAlreadyRunning(_) => ApiError::Conflict(err.to_string()),
            Error::NoItemsToAnalyze(_) | Error::ResponseParse { .. } => {
                ApiError::Unprocessable(err.to_string())
            }
            Error::RateLimited { resume_at } => ApiError::rate_limited_until(resume_at),
            Error::GenerationTransport {
                retry_after: Some(wait),
                ..
            } => ApiError::RateLimited {
                message: err.to_string(),
                retry_after_secs: Some(wait.as_secs().max(1)),
            },
            Error::GenerationTransport { .. } => ApiError::BadGateway(err.to_string()),
            Error::Database(_)
            | Error::Serialization(_)
            | Error::Config(_)
            | Error::Internal(_)
            | Error::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(subsystem = "api", status = status.as_u16(), error = %self, "Request failed");
        }

        let retry_after = match &self {
            ApiError::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        };

        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));
        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
