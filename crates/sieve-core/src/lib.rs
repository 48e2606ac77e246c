//! # sieve-core
//!
//! Core types, taste-graph algorithms, and trait definitions for sieve.
//!
//! This crate has no I/O of its own. Storage lives in `sieve-db`,
//! generation transports in `sieve-inference`.

pub mod defaults;
pub mod error;
pub mod graph;
pub mod logging;
pub mod models;
pub mod shopping;
pub mod similarity;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use graph::{flatten_scope, normalize_tag, Channel, ChannelWeights, TagGraph, TagSignals};
pub use models::*;
pub use shopping::ShoppingLinks;
pub use similarity::{jaccard, rank_source_pairs, SourcePairSimilarity};
pub use traits::*;
