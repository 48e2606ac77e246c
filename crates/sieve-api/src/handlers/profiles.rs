//! Named profiles and their manual tags.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use sieve_core::ProfileUpdate;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProfileBody {
    pub name: String,
    #[serde(default)]
    pub source_ids: Vec<String>,
    #[serde(default)]
    pub manual_tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ManualTagBody {
    pub tag: String,
}

pub async fn list_profiles(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.scopes.list_profiles().await?))
}

pub async fn create_profile(
    State(state): State<AppState>,
    Json(body): Json<CreateProfileBody>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .sieve
        .scopes
        .create_profile(&body.name, body.source_ids, &body.manual_tags)
        .await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.scopes.get_profile(&id).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.scopes.update_profile(&id, update).await?))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.sieve.scopes.delete_profile(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_manual_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ManualTagBody>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.scopes.add_manual_tag(&id, &body.tag).await?))
}

pub async fn remove_manual_tag(
    State(state): State<AppState>,
    Path((id, tag)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.scopes.remove_manual_tag(&id, &tag).await?))
}

pub async fn profile_graph(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.scopes.flatten_profile(&id).await?))
}

pub async fn profile_similarities(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.scopes.profile_similarities(&id).await?))
}
