//! # sieve-jobs
//!
//! Scope management, analysis and generation job orchestration for sieve.
//!
//! This crate provides:
//! - The scope store over sources, profiles, the master graph and saved items
//! - The analysis pipeline turning stored descriptors into taste graphs
//! - A one-job-per-scope generation orchestrator with restart-safe markers
//! - A persisted rate-limit gate shared by every process on the database
//! - Job events via broadcast channels
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sieve_db::Database;
//! use sieve_inference::OpenAIBackend;
//! use sieve_jobs::{GenerationFilters, ScopeSelector, Sieve, StartOutcome};
//!
//! let db = Database::connect("sqlite://sieve.db?mode=rwc").await?;
//! let sieve = Sieve::new(db, Arc::new(OpenAIBackend::from_env()?));
//!
//! sieve.analyzer.analyze_all().await?;
//!
//! let mut events = sieve.generations.subscribe();
//! if let StartOutcome::Accepted { scope_key, .. } = sieve
//!     .generations
//!     .start(ScopeSelector::master(), GenerationFilters::default())
//!     .await?
//! {
//!     while let Ok(event) = events.recv().await {
//!         if event.scope_key() == scope_key {
//!             println!("Event: {:?}", event);
//!         }
//!     }
//! }
//! ```

pub mod analysis;
pub mod orchestrator;
pub mod ratelimit;
pub mod scope;
pub mod service;

// Re-export core types
pub use sieve_core::*;

pub use analysis::{AnalysisConfig, Analyzer};
pub use orchestrator::{GenerationOrchestrator, JobEvent, OrchestratorConfig};
pub use ratelimit::RateLimitGate;
pub use scope::{normalize_tag_list, ScopeStore};
pub use service::Sieve;
