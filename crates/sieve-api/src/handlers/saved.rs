//! Saved recommendations.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use sieve_core::RecommendationItem;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListSavedQuery {
    pub profile_id: Option<String>,
}

pub async fn list_saved(
    State(state): State<AppState>,
    Query(query): Query<ListSavedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .sieve
            .scopes
            .list_saved(query.profile_id.as_deref())
            .await?,
    ))
}

pub async fn save_recommendation(
    State(state): State<AppState>,
    Json(item): Json<RecommendationItem>,
) -> Result<impl IntoResponse, ApiError> {
    let saved = state.sieve.scopes.save_recommendation(item).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn delete_saved(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.sieve.scopes.delete_saved(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
