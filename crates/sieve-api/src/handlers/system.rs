//! Health, stats and wipe.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.sieve.model_name(),
    }))
}

pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.scopes.stats().await?))
}

/// Delete every source, profile, saved item and job record.
pub async fn clear_all(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.sieve.scopes.clear_all().await?;
    warn!(subsystem = "api", op = "clear_all", "All stored data cleared");
    Ok(StatusCode::NO_CONTENT)
}
