//! High-level generation client.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use sieve_core::{
    Descriptor, EmergentConcept, GenerationBackend, GenerationFilters, GenerationRequest,
    RecommendationItem, Result, TagGraph, TagSignals, VisualSignals,
};

use crate::decode::{parse_concept, parse_recommendations, parse_signals, parse_visual_signals};
use crate::prompts::{combination_prompt, recommendation_prompt, signal_prompt, visual_prompt};

/// Runs the four generation tasks against a backend.
///
/// Cheap to clone; the backend is shared.
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    async fn call(&self, op: &'static str, request: &GenerationRequest) -> Result<String> {
        let start = Instant::now();
        let result = self.backend.generate(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(text) => info!(
                subsystem = "inference",
                component = "client",
                op,
                model = %self.backend.model_name(),
                prompt_len = request.prompt_text().len(),
                image_count = request.image_count(),
                response_len = text.len(),
                duration_ms,
                "Generation call complete"
            ),
            Err(e) => warn!(
                subsystem = "inference",
                component = "client",
                op,
                model = %self.backend.model_name(),
                duration_ms,
                retry_after_secs = e.retry_after().map(|d| d.as_secs()),
                error = %e,
                "Generation call failed"
            ),
        }
        result
    }

    /// Extract channel signals from one descriptor batch.
    pub async fn extract_signals(&self, descriptors: &[Descriptor]) -> Result<TagSignals> {
        let raw = self.call("extract_signals", &signal_prompt(descriptors)).await?;
        parse_signals(&raw)
    }

    /// Visual analysis of the batch's images.
    ///
    /// `Ok(None)` when no descriptor has a usable image URL; no call is made.
    pub async fn extract_visual_signals(
        &self,
        descriptors: &[Descriptor],
    ) -> Result<Option<VisualSignals>> {
        let Some(request) = visual_prompt(descriptors) else {
            return Ok(None);
        };
        let raw = self.call("extract_visual_signals", &request).await?;
        parse_visual_signals(&raw).map(Some)
    }

    /// Recommendations for a flattened graph.
    pub async fn recommend(
        &self,
        graph: &TagGraph,
        filters: &GenerationFilters,
        profile_id: Option<&str>,
    ) -> Result<Vec<RecommendationItem>> {
        let raw = self
            .call("recommend", &recommendation_prompt(graph, filters))
            .await?;
        parse_recommendations(&raw, profile_id, Utc::now())
    }

    /// Emergent concept for a tag selection against a context graph.
    pub async fn combine(&self, tags: &[String], graph: &TagGraph) -> Result<EmergentConcept> {
        let raw = self.call("combine", &combination_prompt(tags, graph)).await?;
        parse_concept(&raw)
    }
}
