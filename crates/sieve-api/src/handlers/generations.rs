//! Recommendation generation jobs.
//!
//! Starting a job answers immediately; clients poll the scope key until the
//! status leaves `running`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use sieve_core::{GenerationFilters, ScopeSelector, StartOutcome};

use crate::error::{seconds_until, ApiError};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StartGenerationBody {
    #[serde(flatten)]
    pub selector: ScopeSelector,
    #[serde(default)]
    pub filters: GenerationFilters,
}

/// 202 when accepted, 409 when the scope already has a live job, 429 while
/// rate limited. The body is the start outcome in every case.
pub async fn start_generation(
    State(state): State<AppState>,
    body: Option<Json<StartGenerationBody>>,
) -> Result<impl IntoResponse, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let outcome = state
        .sieve
        .generations
        .start(body.selector, body.filters)
        .await?;

    let status = match &outcome {
        StartOutcome::Accepted { .. } => StatusCode::ACCEPTED,
        StartOutcome::AlreadyRunning { .. } => StatusCode::CONFLICT,
        StartOutcome::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
    };
    let mut response = (status, Json(&outcome)).into_response();
    if let StartOutcome::RateLimited { resume_at } = outcome {
        response.headers_mut().insert(
            axum::http::header::RETRY_AFTER,
            axum::http::HeaderValue::from(seconds_until(resume_at)),
        );
    }
    Ok(response)
}

pub async fn poll_generation(
    State(state): State<AppState>,
    Path(scope_key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.generations.poll(&scope_key).await?))
}

/// Discard a consumed result.
pub async fn acknowledge_generation(
    State(state): State<AppState>,
    Path(scope_key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.sieve.generations.acknowledge(&scope_key).await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

pub async fn rate_limit_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let wait = state.sieve.generations.time_until_allowed().await?;
    Ok(Json(serde_json::json!({
        "limited": wait.is_some(),
        "wait_secs": wait.map(|d| d.as_secs()),
    })))
}
