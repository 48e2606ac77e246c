//! Analysis pipeline: stored descriptors to per-source taste graphs.

use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn};

use sieve_core::defaults::ANALYSIS_BATCH_SIZE;
use sieve_core::{
    AnalysisOutcome, Descriptor, DescriptorRepository, Error, ProductIdea, Result,
    SourceRepository, TagGraph,
};
use sieve_inference::GenerationClient;

use crate::ratelimit::RateLimitGate;
use crate::scope::ScopeStore;

/// Configuration for the analysis pipeline.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Descriptors per signal-extraction call.
    pub batch_size: usize,
    /// Whether to run the visual-analysis prompt as well.
    pub visual_analysis: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            batch_size: ANALYSIS_BATCH_SIZE,
            visual_analysis: true,
        }
    }
}

impl AnalysisConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SIEVE_ANALYSIS_BATCH_SIZE` | `20` | Descriptors per extraction call |
    /// | `SIEVE_VISUAL_ANALYSIS` | `true` | Run visual analysis on image URLs |
    pub fn from_env() -> Self {
        let batch_size = std::env::var("SIEVE_ANALYSIS_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(ANALYSIS_BATCH_SIZE)
            .max(1);

        let visual_analysis = std::env::var("SIEVE_VISUAL_ANALYSIS")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Self {
            batch_size,
            visual_analysis,
        }
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_visual_analysis(mut self, enabled: bool) -> Self {
        self.visual_analysis = enabled;
        self
    }
}

/// Graph delta and visual ideas produced by one analysis run.
struct Extraction {
    delta: TagGraph,
    visual_ideas: Option<Vec<ProductIdea>>,
}

#[derive(Clone)]
pub struct Analyzer {
    scopes: ScopeStore,
    client: GenerationClient,
    gate: RateLimitGate,
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(
        scopes: ScopeStore,
        client: GenerationClient,
        gate: RateLimitGate,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            scopes,
            client,
            gate,
            config,
        }
    }

    /// Analyze one source and rebuild the master graph.
    ///
    /// Returns the source's updated graph. Failures are recorded on the
    /// source and returned.
    pub async fn analyze_source(&self, id: &str) -> Result<TagGraph> {
        let graph = self.analyze_one(id, false).await?;
        self.scopes.rebuild_master(None).await?;
        Ok(graph)
    }

    /// Analyze every source with stored items.
    ///
    /// Each source is attempted independently; one failure does not stop the
    /// batch. The master graph is rebuilt once at the end.
    pub async fn analyze_all(&self) -> Result<Vec<AnalysisOutcome>> {
        let outcomes = self.run_all(false).await?;
        self.scopes.rebuild_master(None).await?;
        Ok(outcomes)
    }

    /// Rebuild every source graph from its stored items.
    ///
    /// A source's new graph replaces the old one only once extraction has
    /// succeeded; on failure the previous graph is kept.
    pub async fn reanalyze_all(&self) -> Result<Vec<AnalysisOutcome>> {
        let outcomes = self.run_all(true).await?;
        self.scopes.rebuild_master(None).await?;
        Ok(outcomes)
    }

    async fn run_all(&self, replace: bool) -> Result<Vec<AnalysisOutcome>> {
        let sources = self.scopes.list_sources().await?;
        let mut outcomes = Vec::with_capacity(sources.len());

        for source in sources.into_iter().filter(|s| s.item_count > 0) {
            let outcome = match self.analyze_one(&source.id, replace).await {
                Ok(_) => AnalysisOutcome {
                    source_id: source.id,
                    ok: true,
                    error: None,
                },
                Err(e) => AnalysisOutcome {
                    source_id: source.id,
                    ok: false,
                    error: Some(e.to_string()),
                },
            };
            outcomes.push(outcome);
        }

        let op = if replace { "reanalyze_all" } else { "analyze_all" };
        info!(
            subsystem = "jobs",
            component = "analysis",
            op,
            source_count = outcomes.len(),
            failed = outcomes.iter().filter(|o| !o.ok).count(),
            "Batch analysis finished"
        );
        Ok(outcomes)
    }

    /// With `replace`, the extraction becomes the whole graph instead of
    /// being folded into the existing one.
    async fn analyze_one(&self, id: &str, replace: bool) -> Result<TagGraph> {
        self.scopes.get_source(id).await?;
        let items = self.scopes.db().descriptors.list_for_source(id).await?;
        if items.is_empty() {
            return Err(Error::NoItemsToAnalyze(id.to_string()));
        }

        let start = Instant::now();
        let extraction = match self.extract(&items).await {
            Ok(extraction) => extraction,
            Err(e) => {
                self.record_failure(id, &e).await;
                return Err(e);
            }
        };

        // Fold the delta into a fresh read; the source may have changed
        // while the generator was running.
        let mut source = self.scopes.get_source(id).await?;
        let visual_ideas = if replace {
            source.graph = extraction.delta;
            extraction.visual_ideas.unwrap_or_default()
        } else {
            source.graph.absorb(&extraction.delta);
            extraction.visual_ideas.unwrap_or(source.visual_ideas)
        };
        self.scopes
            .db()
            .sources
            .store_analysis(id, &source.graph, &visual_ideas, Utc::now())
            .await?;

        info!(
            subsystem = "jobs",
            component = "analysis",
            op = "analyze_source",
            source_id = %id,
            item_count = items.len(),
            tag_count = source.graph.tag_count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Source analyzed"
        );
        Ok(source.graph)
    }

    async fn extract(&self, items: &[Descriptor]) -> Result<Extraction> {
        let mut delta = TagGraph::new();
        for batch in items.chunks(self.config.batch_size) {
            let signals = self.client.extract_signals(batch).await?;
            delta.merge_signals(&signals);
        }

        let mut visual_ideas = None;
        if self.config.visual_analysis {
            match self.client.extract_visual_signals(items).await {
                Ok(Some(visual)) => {
                    delta.merge_signals(&visual.to_tag_signals());
                    visual_ideas = Some(visual.product_ideas);
                }
                Ok(None) => {}
                Err(Error::ResponseParse { raw_text }) => {
                    warn!(
                        subsystem = "jobs",
                        component = "analysis",
                        response_len = raw_text.len(),
                        "Visual analysis reply unusable, keeping text signals only"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Extraction {
            delta,
            visual_ideas,
        })
    }

    async fn record_failure(&self, id: &str, err: &Error) {
        if let Some(wait) = err.retry_after() {
            if let Err(e) = self.gate.record(wait, Utc::now()).await {
                error!(subsystem = "jobs", component = "analysis", error = %e, "Failed to persist rate limit");
            }
        }
        if let Err(e) = self.scopes.db().sources.record_error(id, &err.to_string()).await {
            error!(
                subsystem = "jobs",
                component = "analysis",
                source_id = %id,
                error = %e,
                "Failed to record analysis error"
            );
        }
        warn!(
            subsystem = "jobs",
            component = "analysis",
            op = "analyze_source",
            source_id = %id,
            error = %err,
            "Source analysis failed"
        );
    }
}
