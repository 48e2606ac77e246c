//! OpenAI-compatible generation backend.
//!
//! Works with any endpoint speaking the chat-completions protocol, including
//! OpenAI itself, OpenRouter, vLLM, LM Studio and Ollama's compatibility mode.
//!
//! # Example
//!
//! ```rust,no_run
//! use sieve_core::{GenerationBackend, GenerationRequest};
//! use sieve_inference::openai::{OpenAIBackend, OpenAIConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::new(OpenAIConfig {
//!         base_url: "http://localhost:11434/v1".to_string(),
//!         gen_model: "llava".to_string(),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//!     let reply = backend
//!         .generate(&GenerationRequest::text("", "Say hi", 16))
//!         .await
//!         .unwrap();
//!     println!("{}", reply);
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use error::{retry_after_from_headers, to_sieve_error, OpenAIErrorCode};
pub use types::*;
