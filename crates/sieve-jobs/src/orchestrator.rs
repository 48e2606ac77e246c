//! Generation job orchestrator.
//!
//! One recommendation job per scope key. The in-flight marker and the
//! finished result live in the shared database, so a process that restarts
//! mid-flight (or a second process on the same file) sees the same state.
//!
//! ```text
//! Idle ──start──▶ Running ──ok────▶ Completed (result stored and marker cleared together)
//!                    │
//!                    ├──error──────▶ Failed (marker cleared, message kept in-process)
//!                    ├──429────────▶ Failed + resume timestamp persisted
//!                    └──stale──────▶ Idle (any reader clears the marker)
//! ```
//!
//! Every store write names the job's own `started_at`. A job that went stale
//! and was replaced by a newer claim finishes as `Superseded`: its output is
//! dropped and the newer job's marker is left alone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

use sieve_core::defaults::JOB_STALE_SECS;
use sieve_core::{
    GenerationFilters, GenerationJob, GenerationJobStore, JobState, PollStatus,
    RecommendationItem, Result, ScopeSelector, StartOutcome, TagGraph,
};
use sieve_inference::GenerationClient;

use crate::ratelimit::RateLimitGate;
use crate::scope::ScopeStore;

/// Capacity of the job event channel.
const EVENT_CAPACITY: usize = 64;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Age after which a running marker is treated as abandoned.
    pub stale_after: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(JOB_STALE_SECS as u64),
        }
    }
}

impl OrchestratorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SIEVE_JOB_STALE_SECS` | `300` | Age at which a running marker is abandoned |
    pub fn from_env() -> Self {
        let secs = std::env::var("SIEVE_JOB_STALE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(JOB_STALE_SECS as u64);
        Self {
            stale_after: Duration::from_secs(secs),
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    fn stale_after_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.stale_after)
            .unwrap_or_else(|_| chrono::Duration::seconds(JOB_STALE_SECS))
    }
}

/// Event emitted as jobs move through their states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Started {
        scope_key: String,
        started_at: DateTime<Utc>,
    },
    Completed {
        scope_key: String,
        item_count: usize,
    },
    Failed {
        scope_key: String,
        message: String,
    },
    RateLimited {
        scope_key: String,
        resume_at: DateTime<Utc>,
    },
    /// A newer job claimed the scope before this one finished.
    Superseded {
        scope_key: String,
        started_at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn scope_key(&self) -> &str {
        match self {
            JobEvent::Started { scope_key, .. }
            | JobEvent::Completed { scope_key, .. }
            | JobEvent::Failed { scope_key, .. }
            | JobEvent::RateLimited { scope_key, .. }
            | JobEvent::Superseded { scope_key, .. } => scope_key,
        }
    }
}

/// Terminal outcome that is never persisted.
#[derive(Debug, Clone)]
enum LocalOutcome {
    Failed(String),
    RateLimited(DateTime<Utc>),
}

#[derive(Clone)]
pub struct GenerationOrchestrator {
    scopes: ScopeStore,
    client: GenerationClient,
    gate: RateLimitGate,
    config: OrchestratorConfig,
    outcomes: Arc<RwLock<HashMap<String, LocalOutcome>>>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl GenerationOrchestrator {
    pub fn new(
        scopes: ScopeStore,
        client: GenerationClient,
        gate: RateLimitGate,
        config: OrchestratorConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            scopes,
            client,
            gate,
            config,
            outcomes: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Receiver for job events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Remaining rate-limit wait before a new job may start.
    pub async fn time_until_allowed(&self) -> Result<Option<Duration>> {
        self.gate.time_until_allowed(Utc::now()).await
    }

    /// Start a recommendation job for a scope.
    ///
    /// Refused while rate limited or while a live job holds the scope; in
    /// the latter case no generation call is made. On acceptance any earlier
    /// result for the scope is discarded and the call runs in the background.
    pub async fn start(
        &self,
        selector: ScopeSelector,
        filters: GenerationFilters,
    ) -> Result<StartOutcome> {
        let now = Utc::now();
        if let Some(resume_at) = self.gate.resume_at(now).await? {
            info!(
                subsystem = "jobs",
                component = "orchestrator",
                op = "start",
                scope_key = %selector.scope_key(),
                resume_at = %resume_at,
                "Generation refused while rate limited"
            );
            return Ok(StartOutcome::RateLimited { resume_at });
        }

        let graph = self.scopes.flatten_scope(&selector).await?;
        let job = GenerationJob::new(selector, filters);
        let scope_key = job.scope_key.clone();
        let store = &self.scopes.db().generations;

        let stale_before = job.started_at - self.config.stale_after_chrono();
        if !store.try_begin(&job, stale_before).await? {
            let started_at = store
                .marker(&scope_key)
                .await?
                .map(|m| m.started_at)
                .unwrap_or(job.started_at);
            info!(
                subsystem = "jobs",
                component = "orchestrator",
                op = "start",
                scope_key = %scope_key,
                started_at = %started_at,
                "Generation already running for scope"
            );
            return Ok(StartOutcome::AlreadyRunning {
                scope_key,
                started_at,
            });
        }

        store.clear_result(&scope_key).await?;
        self.outcomes.write().await.remove(&scope_key);

        info!(
            subsystem = "jobs",
            component = "orchestrator",
            op = "start",
            scope_key = %scope_key,
            tag_count = graph.tag_count(),
            "Generation job accepted"
        );
        let _ = self.event_tx.send(JobEvent::Started {
            scope_key: scope_key.clone(),
            started_at: job.started_at,
        });

        let started_at = job.started_at;
        let runner = self.clone();
        tokio::spawn(async move {
            runner.run(job, graph).await;
        });

        Ok(StartOutcome::Accepted {
            scope_key,
            started_at,
        })
    }

    /// Execute a claimed job to a terminal state.
    async fn run(&self, job: GenerationJob, graph: TagGraph) {
        let profile_id = job.selector.profile_id.as_deref();

        let event = match self.client.recommend(&graph, &job.filters, profile_id).await {
            Ok(items) => self.finish(&job, &items).await,
            Err(e) => {
                let resume_at = match e.retry_after() {
                    Some(wait) => match self.gate.record(wait, Utc::now()).await {
                        Ok(resume_at) => Some(resume_at),
                        Err(db_err) => {
                            error!(
                                subsystem = "jobs",
                                component = "orchestrator",
                                error = %db_err,
                                "Failed to persist rate limit"
                            );
                            None
                        }
                    },
                    None => None,
                };

                if !self.release(&job).await {
                    self.superseded(&job)
                } else if let Some(resume_at) = resume_at {
                    self.outcomes.write().await.insert(
                        job.scope_key.clone(),
                        LocalOutcome::RateLimited(resume_at),
                    );
                    JobEvent::RateLimited {
                        scope_key: job.scope_key.clone(),
                        resume_at,
                    }
                } else {
                    warn!(
                        subsystem = "jobs",
                        component = "orchestrator",
                        scope_key = %job.scope_key,
                        error = %e,
                        "Generation job failed"
                    );
                    self.fail(&job.scope_key, e.to_string()).await
                }
            }
        };

        let _ = self.event_tx.send(event);
    }

    async fn finish(&self, job: &GenerationJob, items: &[RecommendationItem]) -> JobEvent {
        let scope_key = job.scope_key.as_str();
        match self
            .scopes
            .db()
            .generations
            .complete(job, items, Utc::now())
            .await
        {
            Ok(true) => {
                info!(
                    subsystem = "jobs",
                    component = "orchestrator",
                    scope_key = %scope_key,
                    item_count = items.len(),
                    "Generation job completed"
                );
                JobEvent::Completed {
                    scope_key: scope_key.to_string(),
                    item_count: items.len(),
                }
            }
            Ok(false) => self.superseded(job),
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "orchestrator",
                    scope_key = %scope_key,
                    error = %e,
                    "Failed to store generation result"
                );
                if self.release(job).await {
                    self.fail(scope_key, e.to_string()).await
                } else {
                    self.superseded(job)
                }
            }
        }
    }

    /// Drop `job`'s marker. Returns false if a newer job holds the scope.
    async fn release(&self, job: &GenerationJob) -> bool {
        match self.scopes.db().generations.clear_marker(job).await {
            Ok(owned) => owned,
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "orchestrator",
                    scope_key = %job.scope_key,
                    error = %e,
                    "Failed to clear generation marker"
                );
                true
            }
        }
    }

    fn superseded(&self, job: &GenerationJob) -> JobEvent {
        warn!(
            subsystem = "jobs",
            component = "orchestrator",
            scope_key = %job.scope_key,
            started_at = %job.started_at,
            "Generation job outlived its claim, output discarded"
        );
        JobEvent::Superseded {
            scope_key: job.scope_key.clone(),
            started_at: job.started_at,
        }
    }

    async fn fail(&self, scope_key: &str, message: String) -> JobEvent {
        self.outcomes
            .write()
            .await
            .insert(scope_key.to_string(), LocalOutcome::Failed(message.clone()));
        JobEvent::Failed {
            scope_key: scope_key.to_string(),
            message,
        }
    }

    /// Current status of a scope.
    ///
    /// A stale marker is cleared and reads as if it never existed. Failure
    /// and rate-limit outcomes are only known to the process that ran the
    /// job and are reported once.
    pub async fn poll(&self, scope_key: &str) -> Result<PollStatus> {
        let store = &self.scopes.db().generations;
        let now = Utc::now();

        if let Some(job) = store.marker(scope_key).await? {
            if !job.is_stale(now, self.config.stale_after_chrono()) {
                return Ok(PollStatus::Running {
                    started_at: job.started_at,
                });
            }
            if store.clear_marker(&job).await? {
                info!(
                    subsystem = "jobs",
                    component = "orchestrator",
                    op = "poll",
                    scope_key = %scope_key,
                    started_at = %job.started_at,
                    "Cleared abandoned generation marker"
                );
            } else if let Some(current) = store.marker(scope_key).await? {
                // Claimed by a newer job between the read and the delete.
                return Ok(PollStatus::Running {
                    started_at: current.started_at,
                });
            }
        }

        if let Some((items, _)) = store.result(scope_key).await? {
            return Ok(PollStatus::Completed { items });
        }

        Ok(match self.outcomes.write().await.remove(scope_key) {
            Some(LocalOutcome::Failed(message)) => PollStatus::Failed { message },
            Some(LocalOutcome::RateLimited(resume_at)) => PollStatus::RateLimited { resume_at },
            None => PollStatus::Absent,
        })
    }

    /// Durable state of a scope as any process would see it.
    pub async fn state(&self, scope_key: &str) -> Result<JobState> {
        self.scopes.db().generations.load_state(scope_key).await
    }

    /// Discard a consumed result. Returns true if one was removed.
    pub async fn acknowledge(&self, scope_key: &str) -> Result<bool> {
        let removed = self.scopes.db().generations.clear_result(scope_key).await?;
        let had_outcome = self.outcomes.write().await.remove(scope_key).is_some();
        Ok(removed || had_outcome)
    }
}
