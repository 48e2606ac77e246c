//! Centralized default constants for sieve.
//!
//! Every crate references these instead of defining its own magic numbers.

// =============================================================================
// TASTE GRAPH
// =============================================================================

/// Tags per channel included in a recommendation prompt summary.
pub const TOP_TAGS_PER_CHANNEL: usize = 8;

/// Tags per channel included as context for tag combination.
pub const COMBINE_CONTEXT_PER_CHANNEL: usize = 6;

/// Keyword weight contributed by each profile manual tag.
pub const MANUAL_TAG_BONUS: u64 = 5;

/// Weight assigned to a manual tag on the master graph.
pub const MASTER_MANUAL_TAG_WEIGHT: u64 = 1;

// =============================================================================
// ANALYSIS
// =============================================================================

/// Descriptors per signal-extraction prompt.
pub const ANALYSIS_BATCH_SIZE: usize = 20;

/// Maximum images attached to one visual-analysis prompt.
pub const VISUAL_IMAGE_CAP: usize = 6;

// =============================================================================
// GENERATION
// =============================================================================

/// Items requested per recommendation run.
pub const RECOMMENDATION_COUNT: usize = 8;

/// Output token cap for signal extraction.
pub const SIGNAL_MAX_TOKENS: u32 = 1024;

/// Output token cap for visual analysis.
pub const VISUAL_MAX_TOKENS: u32 = 2000;

/// Output token cap for recommendation generation.
pub const RECOMMEND_MAX_TOKENS: u32 = 5000;

/// Output token cap for tag combination.
pub const COMBINE_MAX_TOKENS: u32 = 2000;

// =============================================================================
// JOBS
// =============================================================================

/// Age after which a running marker is considered abandoned.
pub const JOB_STALE_SECS: i64 = 300;

/// Cooldown applied when a rate-limit response carries no usable hint.
pub const RATE_LIMIT_COOLDOWN_SECS: u64 = 3600;

/// Settings key holding the persisted rate-limit resume timestamp.
pub const RATE_LIMIT_SETTING_KEY: &str = "rate_limit_resume_at";

// =============================================================================
// BACKEND
// =============================================================================

/// Default base URL of the OpenAI-compatible generation endpoint.
pub const GEN_BASE_URL: &str = "https://api.openai.com/v1";

/// Default generation model.
pub const GEN_MODEL: &str = "gpt-4o-mini";

/// HTTP timeout for generation requests, in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// SERVER
// =============================================================================

/// Default listen port for the HTTP API.
pub const SERVER_PORT: u16 = 3000;

/// Default SQLite database URL.
pub const DATABASE_URL: &str = "sqlite://sieve.db?mode=rwc";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_caps_ordering() {
        assert!(SIGNAL_MAX_TOKENS < VISUAL_MAX_TOKENS);
        assert!(VISUAL_MAX_TOKENS < RECOMMEND_MAX_TOKENS);
    }

    #[test]
    fn test_combine_context_within_summary() {
        assert!(COMBINE_CONTEXT_PER_CHANNEL <= TOP_TAGS_PER_CHANNEL);
    }
}
