//! Core traits for sieve abstractions.
//!
//! Storage and generation sit behind these traits so the pipeline and the
//! job orchestrator can run against SQLite in production and mocks in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::graph::TagGraph;
use crate::models::*;

// =============================================================================
// SOURCE REPOSITORY TRAITS
// =============================================================================

/// Repository for sources and their graphs.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Create the source if unseen, otherwise refresh its name and url.
    /// The user label and graph are left untouched.
    async fn upsert(&self, id: &str, meta: &SourceMeta) -> Result<Source>;

    async fn get(&self, id: &str) -> Result<Option<Source>>;

    /// All sources ordered by id.
    async fn list(&self) -> Result<Vec<Source>>;

    /// Persist a freshly analyzed graph, clearing any recorded error.
    async fn store_analysis(
        &self,
        id: &str,
        graph: &TagGraph,
        visual_ideas: &[ProductIdea],
        analyzed_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn set_item_count(&self, id: &str, count: i64) -> Result<()>;

    /// Returns false when the source does not exist.
    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool>;

    /// Returns false when the source does not exist.
    async fn set_label(&self, id: &str, label: &str) -> Result<bool>;

    async fn record_error(&self, id: &str, message: &str) -> Result<()>;

    /// Delete a source and its descriptors. Returns false if it was absent.
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// Repository for raw descriptors.
#[async_trait]
pub trait DescriptorRepository: Send + Sync {
    /// Store descriptors, skipping identities already present for the
    /// source. Returns the number newly stored.
    async fn insert_batch(&self, source_id: &str, descriptors: &[Descriptor]) -> Result<usize>;

    /// Descriptors in submission order.
    async fn list_for_source(&self, source_id: &str) -> Result<Vec<Descriptor>>;

    async fn count_for_source(&self, source_id: &str) -> Result<i64>;
}

// =============================================================================
// PROFILE & MASTER GRAPH TRAITS
// =============================================================================

/// Repository for profiles.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn insert(&self, profile: &Profile) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Profile>>;

    /// All profiles, oldest first.
    async fn list(&self) -> Result<Vec<Profile>>;

    /// Apply a partial update, returning the stored profile.
    async fn update(&self, id: &str, update: &ProfileUpdate) -> Result<Profile>;

    async fn delete(&self, id: &str) -> Result<bool>;

    /// Drop a source id from every profile that references it.
    async fn remove_source_refs(&self, source_id: &str) -> Result<u64>;
}

/// Storage for the cached master graph.
#[async_trait]
pub trait MasterGraphRepository: Send + Sync {
    async fn get(&self) -> Result<Option<MasterGraph>>;

    async fn put(&self, master: &MasterGraph) -> Result<()>;
}

/// Repository for saved recommendations.
#[async_trait]
pub trait SavedRecommendationRepository: Send + Sync {
    async fn save(&self, saved: &SavedRecommendation) -> Result<()>;

    /// Saved items newest first, optionally narrowed to one profile.
    async fn list(&self, profile_id: Option<&str>) -> Result<Vec<SavedRecommendation>>;

    async fn delete(&self, id: &str) -> Result<bool>;
}

// =============================================================================
// GENERATION SIDE-STORE
// =============================================================================

/// Durable record of in-flight markers and finished results per scope.
///
/// Any process sharing the store observes the same state, so a restarted
/// process picks up where the previous one left off.
#[async_trait]
pub trait GenerationJobStore: Send + Sync {
    /// Atomically claim a scope.
    ///
    /// Markers started before `stale_before` are discarded first. Returns
    /// true if `job` now holds the scope, false if a live marker exists.
    async fn try_begin(&self, job: &GenerationJob, stale_before: DateTime<Utc>) -> Result<bool>;

    async fn marker(&self, scope_key: &str) -> Result<Option<GenerationJob>>;

    /// Remove `job`'s marker if it still holds the scope.
    ///
    /// Returns false when the scope is idle or claimed by a newer job, whose
    /// marker is left in place.
    async fn clear_marker(&self, job: &GenerationJob) -> Result<bool>;

    /// Store `items` as the scope's result and release `job`'s marker, in
    /// one transaction.
    ///
    /// Returns false, writing nothing, if `job` no longer holds the scope.
    async fn complete(
        &self,
        job: &GenerationJob,
        items: &[RecommendationItem],
        completed_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn result(
        &self,
        scope_key: &str,
    ) -> Result<Option<(Vec<RecommendationItem>, DateTime<Utc>)>>;

    /// Returns true if a result was removed.
    async fn clear_result(&self, scope_key: &str) -> Result<bool>;

    /// Durable state of a scope. A marker wins over a result.
    async fn load_state(&self, scope_key: &str) -> Result<JobState> {
        if let Some(job) = self.marker(scope_key).await? {
            return Ok(JobState::Running { job });
        }
        Ok(match self.result(scope_key).await? {
            Some((items, completed_at)) => JobState::Completed {
                items,
                completed_at,
            },
            None => JobState::Idle,
        })
    }
}

/// Small key/value store for process-wide settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    async fn delete_setting(&self, key: &str) -> Result<()>;
}

// =============================================================================
// GENERATION BACKEND
// =============================================================================

/// One piece of a multimodal prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    Text(String),
    /// Remote image fetched by the backend.
    ImageUrl(String),
}

/// A generation request: system instruction, ordered parts, token cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system: String,
    pub parts: Vec<PromptPart>,
    pub max_output_tokens: u32,
}

impl GenerationRequest {
    /// Text-only request.
    pub fn text(system: impl Into<String>, prompt: impl Into<String>, max_output_tokens: u32) -> Self {
        Self {
            system: system.into(),
            parts: vec![PromptPart::Text(prompt.into())],
            max_output_tokens,
        }
    }

    pub fn with_part(mut self, part: PromptPart) -> Self {
        self.parts.push(part);
        self
    }

    /// Concatenated text parts, for logging and test assertions.
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                PromptPart::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of image parts.
    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| !matches!(p, PromptPart::Text(_)))
            .count()
    }
}

/// Backend for text generation.
///
/// Transport failures surface as [`crate::Error::GenerationTransport`]; a
/// rate-limit response sets its `retry_after`.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}
