//! Source submission, management and analysis.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use sieve_core::{Descriptor, SourceMeta};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitDescriptorsBody {
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub meta: SourceMeta,
    #[serde(default)]
    pub items: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSourceBody {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

pub async fn submit_descriptors(
    State(state): State<AppState>,
    Json(body): Json<SubmitDescriptorsBody>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .sieve
        .scopes
        .submit_descriptors(body.source_id.as_deref(), &body.meta, &body.items)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn list_sources(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.scopes.list_sources().await?))
}

pub async fn get_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.scopes.get_source(&id).await?))
}

pub async fn list_descriptors(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.scopes.list_descriptors(&id).await?))
}

/// Rename and/or toggle a source. Toggling rebuilds the master graph.
pub async fn update_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateSourceBody>,
) -> Result<impl IntoResponse, ApiError> {
    let scopes = &state.sieve.scopes;
    if let Some(label) = body.label.as_deref() {
        scopes.rename_source(&id, label).await?;
    }
    if let Some(enabled) = body.enabled {
        scopes.set_source_enabled(&id, enabled).await?;
    }
    Ok(Json(scopes.get_source(&id).await?))
}

pub async fn delete_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.sieve.scopes.delete_source(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn analyze_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.analyzer.analyze_source(&id).await?))
}

pub async fn analyze_all(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.analyzer.analyze_all().await?))
}

pub async fn reanalyze_all(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.analyzer.reanalyze_all().await?))
}
