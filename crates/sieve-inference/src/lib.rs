//! # sieve-inference
//!
//! Generation transports, prompt construction and structured-output
//! recovery for sieve.
//!
//! This crate provides:
//! - OpenAI-compatible chat-completions backend
//! - Pure prompt builders for signal extraction, visual analysis,
//!   recommendation and tag combination
//! - A string-aware parser that recovers JSON from truncated replies
//! - Typed decoders and a [`GenerationClient`] tying them together
//!
//! # Feature Flags
//!
//! - `mock`: expose [`mock::MockGenerationBackend`] outside this crate's tests

pub mod client;
pub mod decode;
pub mod openai;
pub mod prompts;
pub mod structured;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use sieve_core::*;

pub use client::GenerationClient;
pub use decode::{parse_concept, parse_recommendations, parse_signals, parse_visual_signals};
pub use openai::{OpenAIBackend, OpenAIConfig};
pub use structured::{parse_structured, parse_structured_with_stage, Parsed, RepairStage, Shape};
