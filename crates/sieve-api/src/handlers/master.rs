//! Master graph and tag combination.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use sieve_core::Channel;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RebuildMasterBody {
    #[serde(default)]
    pub source_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct MasterTagBody {
    #[serde(default)]
    pub channel: Option<String>,
    pub tag: String,
    #[serde(default)]
    pub weight: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CombineBody {
    pub tags: Vec<String>,
}

pub async fn get_master(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.scopes.master_graph().await?))
}

pub async fn rebuild_master(
    State(state): State<AppState>,
    body: Option<Json<RebuildMasterBody>>,
) -> Result<impl IntoResponse, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(
        state
            .sieve
            .scopes
            .rebuild_master(body.source_ids.as_deref())
            .await?,
    ))
}

pub async fn add_master_tag(
    State(state): State<AppState>,
    Json(body): Json<MasterTagBody>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = body
        .channel
        .as_deref()
        .map(|name| {
            Channel::parse(name)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown channel: {}", name)))
        })
        .transpose()?;
    Ok(Json(
        state
            .sieve
            .scopes
            .add_master_tag(channel, &body.tag, body.weight)
            .await?,
    ))
}

pub async fn remove_master_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.scopes.remove_master_tag(&tag).await?))
}

pub async fn combine_tags(
    State(state): State<AppState>,
    Json(body): Json<CombineBody>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sieve.combine_tags(&body.tags).await?))
}
