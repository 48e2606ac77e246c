//! Structured logging field names shared by every sieve crate.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, analysis and generation completions |
//! | DEBUG | Decision points, prompt sizes, repair stages |
//! | TRACE | Per-item iteration (tags, descriptors) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across request → job → sub-calls.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "db", "inference", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "orchestrator", "analysis", "openai", "pool", "parser"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "analyze_source", "start", "poll", "generate"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Source id being operated on.
pub const SOURCE_ID: &str = "source_id";

/// Profile id being operated on.
pub const PROFILE_ID: &str = "profile_id";

/// Generation scope key ("master" or a profile id).
pub const SCOPE_KEY: &str = "scope_key";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of descriptors in a batch or source.
pub const ITEM_COUNT: &str = "item_count";

/// Number of (channel, tag) entries in a graph.
pub const TAG_COUNT: &str = "tag_count";

/// Number of images attached to a prompt.
pub const IMAGE_COUNT: &str = "image_count";

/// Byte length of a prompt.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

/// Which parser stage produced a value: "strict", "balance", "trim".
pub const REPAIR_STAGE: &str = "repair_stage";

/// Seconds until generation may resume after a rate limit.
pub const RETRY_AFTER_SECS: &str = "retry_after_secs";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
