//! Top-level service handle.
//!
//! [`Sieve`] wires the scope store, analysis pipeline and generation
//! orchestrator over one database and one generation backend. It is cheap to
//! clone and is what the HTTP layer holds in its state.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use sieve_core::{EmergentConcept, Error, GenerationBackend, Result};
use sieve_db::Database;
use sieve_inference::GenerationClient;

use crate::analysis::{AnalysisConfig, Analyzer};
use crate::orchestrator::{GenerationOrchestrator, OrchestratorConfig};
use crate::ratelimit::RateLimitGate;
use crate::scope::{normalize_tag_list, ScopeStore};

#[derive(Clone)]
pub struct Sieve {
    pub scopes: ScopeStore,
    pub analyzer: Analyzer,
    pub generations: GenerationOrchestrator,
    client: GenerationClient,
    gate: RateLimitGate,
}

impl Sieve {
    /// Build with default analysis and orchestrator settings.
    pub fn new(db: Database, backend: Arc<dyn GenerationBackend>) -> Self {
        Self::with_config(
            db,
            backend,
            AnalysisConfig::default(),
            OrchestratorConfig::default(),
        )
    }

    pub fn with_config(
        db: Database,
        backend: Arc<dyn GenerationBackend>,
        analysis: AnalysisConfig,
        orchestrator: OrchestratorConfig,
    ) -> Self {
        let gate = RateLimitGate::new(db.settings.clone());
        let scopes = ScopeStore::new(db);
        let client = GenerationClient::new(backend);

        Self {
            analyzer: Analyzer::new(scopes.clone(), client.clone(), gate.clone(), analysis),
            generations: GenerationOrchestrator::new(
                scopes.clone(),
                client.clone(),
                gate.clone(),
                orchestrator,
            ),
            scopes,
            client,
            gate,
        }
    }

    pub fn db(&self) -> &Database {
        self.scopes.db()
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Ask the generator for a concept emerging from a tag selection.
    ///
    /// The master graph supplies context and must not be empty. Refused
    /// while the rate-limit window is open.
    pub async fn combine_tags(&self, tags: &[String]) -> Result<EmergentConcept> {
        let tags = normalize_tag_list(tags);
        if tags.is_empty() {
            return Err(Error::InvalidInput(
                "at least one tag is required".to_string(),
            ));
        }

        if let Some(resume_at) = self.gate.resume_at(Utc::now()).await? {
            return Err(Error::RateLimited { resume_at });
        }

        let master = self.scopes.master_graph().await?;
        if master.graph.is_empty() {
            return Err(Error::InvalidInput(
                "master graph is empty; analyze a source first".to_string(),
            ));
        }

        match self.client.combine(&tags, &master.graph).await {
            Ok(concept) => {
                info!(
                    subsystem = "jobs",
                    component = "service",
                    op = "combine_tags",
                    tag_count = tags.len(),
                    emergent_count = concept.emergent_tags.len(),
                    "Tag combination generated"
                );
                Ok(concept)
            }
            Err(e) => {
                if let Some(wait) = e.retry_after() {
                    self.gate.record(wait, Utc::now()).await?;
                }
                Err(e)
            }
        }
    }
}
