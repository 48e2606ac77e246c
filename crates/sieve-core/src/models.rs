//! Core data models for sieve.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::graph::TagGraph;
use crate::shopping::ShoppingLinks;

// =============================================================================
// SOURCES
// =============================================================================

/// Origin identity supplied alongside a descriptor batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub name: String,
    #[serde(default)]
    pub url: String,
}

/// One raw content item (title / alt-text / url, plus an optional image).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Descriptor {
    /// Stable identity: the caller's id, or a content hash when none was given.
    pub fn identity(&self) -> String {
        let id = self.id.trim();
        if !id.is_empty() {
            return id.to_string();
        }
        let mut hasher = Sha256::new();
        hasher.update(self.url.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.title.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.alt.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("d-{}", &digest[..16])
    }
}

/// Error recorded on a source by its most recent failed analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// A product idea suggested by visual analysis or tag combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductIdea {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub search_query: Option<String>,
    #[serde(default)]
    pub price_range: Option<String>,
    pub links: ShoppingLinks,
}

/// One content origin and its accumulated taste graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    /// User-editable display label, defaults to `name`.
    pub label: String,
    pub url: String,
    pub item_count: i64,
    pub graph: TagGraph,
    pub enabled: bool,
    #[serde(default)]
    pub visual_ideas: Vec<ProductIdea>,
    pub updated_at: DateTime<Utc>,
    pub analyzed_at: Option<DateTime<Utc>>,
    pub last_error: Option<SourceError>,
}

impl Source {
    /// A freshly discovered source with an empty graph.
    pub fn new(id: String, meta: &SourceMeta) -> Self {
        Self {
            id,
            name: meta.name.clone(),
            label: meta.name.clone(),
            url: meta.url.clone(),
            item_count: 0,
            graph: TagGraph::new(),
            enabled: true,
            visual_ideas: Vec::new(),
            updated_at: Utc::now(),
            analyzed_at: None,
            last_error: None,
        }
    }
}

/// Lower-case slug of `[a-z0-9]` runs joined by `-`, at most 60 chars.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars().flat_map(|c| c.to_lowercase()) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug.truncate(60);
    slug.trim_end_matches('-').to_string()
}

/// Path segments of a URL, without scheme, host, query or fragment.
fn url_path_segments(url: &str) -> Vec<&str> {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or("");
    let path = match without_scheme.find('/') {
        Some(idx) => &without_scheme[idx..],
        None => return Vec::new(),
    };
    let path = path.split(['?', '#']).next().unwrap_or("");
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Derive a source id from its origin identity.
///
/// Same origin, same id, on every visit: first two URL path segments, else
/// the name, else a hash of both.
pub fn source_id_for(meta: &SourceMeta) -> String {
    let segments = url_path_segments(&meta.url);
    if segments.len() >= 2 {
        let slug = slugify(&segments[..2].join("-"));
        if !slug.is_empty() {
            return slug;
        }
    }
    let slug = slugify(&meta.name);
    if !slug.is_empty() {
        return slug;
    }
    let mut hasher = Sha256::new();
    hasher.update(meta.name.as_bytes());
    hasher.update([0u8]);
    hasher.update(meta.url.as_bytes());
    format!("source-{}", &hex::encode(hasher.finalize())[..12])
}

/// Result of a descriptor submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub source_id: String,
    /// Descriptors not previously stored for this source.
    pub accepted: usize,
    pub item_count: i64,
}

/// Per-source result of a batch analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub source_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// =============================================================================
// PROFILES & MASTER GRAPH
// =============================================================================

/// Named grouping over a subset of sources plus manual tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub source_ids: Vec<String>,
    pub manual_tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(name: String, source_ids: Vec<String>, manual_tags: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            name,
            source_ids,
            manual_tags,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for a profile; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub source_ids: Option<Vec<String>>,
    pub manual_tags: Option<Vec<String>>,
}

/// Cached flattened union of the enabled sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterGraph {
    pub graph: TagGraph,
    pub source_ids: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// RECOMMENDATIONS
// =============================================================================

/// A generated recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price_range: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub match_reason: String,
    #[serde(default)]
    pub search_query: Option<String>,
    pub links: ShoppingLinks,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub profile_id: Option<String>,
}

/// A recommendation the user chose to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRecommendation {
    #[serde(flatten)]
    pub item: RecommendationItem,
    pub saved_at: DateTime<Utc>,
}

/// Emergent concept produced by combining selected tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergentConcept {
    pub combined_concept: String,
    pub description: String,
    pub emergent_tags: Vec<String>,
    pub gift_ideas: Vec<ProductIdea>,
    pub mood_board: Vec<String>,
}

/// Signals from the visual-analysis prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualSignals {
    pub visual_aesthetics: Vec<String>,
    pub product_categories: Vec<String>,
    pub lifestyle_signals: Vec<String>,
    pub product_ideas: Vec<ProductIdea>,
    pub dominant_colors: Vec<String>,
    pub mood_keywords: Vec<String>,
}

impl VisualSignals {
    /// Map onto graph channels: moods feed themes, visuals feed aesthetics.
    pub fn to_tag_signals(&self) -> crate::graph::TagSignals {
        use crate::graph::{Channel, TagSignals};
        let mut signals = TagSignals::new();
        signals.push(Channel::Themes, self.mood_keywords.iter().cloned());
        signals.push(Channel::Aesthetics, self.visual_aesthetics.iter().cloned());
        signals.push(Channel::Categories, self.product_categories.iter().cloned());
        signals.push(Channel::Lifestyle, self.lifestyle_signals.iter().cloned());
        signals.push(Channel::Colors, self.dominant_colors.iter().cloned());
        signals
    }
}

// =============================================================================
// GENERATION JOBS
// =============================================================================

/// Scope key used when no profile is selected.
pub const MASTER_SCOPE: &str = "master";

/// Optional narrowing for recommendation generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationFilters {
    #[serde(default)]
    pub occasion: Option<String>,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub recipient_age: Option<String>,
}

impl GenerationFilters {
    /// Occasion, if set and non-blank.
    pub fn occasion(&self) -> Option<&str> {
        non_blank(self.occasion.as_deref())
    }

    /// Budget, ignoring the "any" placeholder.
    pub fn budget(&self) -> Option<&str> {
        non_blank(self.budget.as_deref()).filter(|b| !b.eq_ignore_ascii_case("any"))
    }

    /// Recipient age band, ignoring the "adult" default.
    pub fn recipient_age(&self) -> Option<&str> {
        non_blank(self.recipient_age.as_deref()).filter(|a| !a.eq_ignore_ascii_case("adult"))
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Which graph a generation runs against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSelector {
    #[serde(default)]
    pub profile_id: Option<String>,
    /// Explicit source subset for the master scope.
    #[serde(default)]
    pub source_ids: Option<Vec<String>>,
}

impl ScopeSelector {
    pub fn master() -> Self {
        Self::default()
    }

    pub fn profile(id: impl Into<String>) -> Self {
        Self {
            profile_id: Some(id.into()),
            source_ids: None,
        }
    }

    /// `profile_id`, or `"master"`.
    pub fn scope_key(&self) -> String {
        self.profile_id
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| MASTER_SCOPE.to_string())
    }
}

/// In-flight generation marker, persisted while running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub scope_key: String,
    pub selector: ScopeSelector,
    pub filters: GenerationFilters,
    pub started_at: DateTime<Utc>,
}

impl GenerationJob {
    pub fn new(selector: ScopeSelector, filters: GenerationFilters) -> Self {
        Self {
            scope_key: selector.scope_key(),
            selector,
            filters,
            started_at: Utc::now(),
        }
    }

    /// Whether the marker is older than `stale_after`.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: chrono::Duration) -> bool {
        now - self.started_at > stale_after
    }
}

/// Durable view of a scope's generation state.
///
/// Failures are never persisted: a reader that finds neither a marker nor a
/// result sees `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running {
        job: GenerationJob,
    },
    Completed {
        items: Vec<RecommendationItem>,
        completed_at: DateTime<Utc>,
    },
}

/// What a caller sees when polling a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollStatus {
    Running { started_at: DateTime<Utc> },
    Completed { items: Vec<RecommendationItem> },
    Failed { message: String },
    RateLimited { resume_at: DateTime<Utc> },
    Absent,
}

/// Answer to a start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    Accepted {
        scope_key: String,
        started_at: DateTime<Utc>,
    },
    AlreadyRunning {
        scope_key: String,
        started_at: DateTime<Utc>,
    },
    RateLimited {
        resume_at: DateTime<Utc>,
    },
}

// =============================================================================
// STATS
// =============================================================================

/// Store-wide counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub source_count: i64,
    pub item_count: i64,
    pub analyzed_sources: i64,
    pub profile_count: i64,
    pub saved_count: i64,
    pub master_updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, url: &str) -> SourceMeta {
        SourceMeta {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Cozy Home -- Ideas!"), "cozy-home-ideas");
        assert_eq!(slugify("  --  "), "");
        assert_eq!(slugify(&"a".repeat(80)).len(), 60);
    }

    #[test]
    fn test_source_id_from_url_path() {
        let id = source_id_for(&meta("Whatever", "https://www.example.com/alice/cozy-home/?ref=x"));
        assert_eq!(id, "alice-cozy-home");
    }

    #[test]
    fn test_source_id_is_stable_across_visits() {
        let m = meta("Garden Board", "https://example.com/bob/garden/");
        assert_eq!(source_id_for(&m), source_id_for(&m.clone()));
    }

    #[test]
    fn test_source_id_falls_back_to_name_then_hash() {
        assert_eq!(source_id_for(&meta("My Board", "not a url")), "my-board");
        let hashed = source_id_for(&meta("★★★", ""));
        assert!(hashed.starts_with("source-"));
        assert_eq!(hashed, source_id_for(&meta("★★★", "")));
        assert_ne!(hashed, source_id_for(&meta("☆☆☆", "")));
    }

    #[test]
    fn test_descriptor_identity_prefers_id() {
        let mut d = Descriptor {
            id: "pin-1".to_string(),
            title: "Mug".to_string(),
            ..Default::default()
        };
        assert_eq!(d.identity(), "pin-1");
        d.id.clear();
        let derived = d.identity();
        assert!(derived.starts_with("d-"));
        assert_eq!(derived, d.identity());
    }

    #[test]
    fn test_filters_ignore_placeholders() {
        let filters = GenerationFilters {
            occasion: Some("  ".to_string()),
            budget: Some("any".to_string()),
            recipient_age: Some("Adult".to_string()),
        };
        assert!(filters.occasion().is_none());
        assert!(filters.budget().is_none());
        assert!(filters.recipient_age().is_none());

        let filters = GenerationFilters {
            occasion: Some("birthday".to_string()),
            budget: Some("under $50".to_string()),
            recipient_age: Some("teen".to_string()),
        };
        assert_eq!(filters.occasion(), Some("birthday"));
        assert_eq!(filters.budget(), Some("under $50"));
        assert_eq!(filters.recipient_age(), Some("teen"));
    }

    #[test]
    fn test_scope_key() {
        assert_eq!(ScopeSelector::master().scope_key(), MASTER_SCOPE);
        assert_eq!(ScopeSelector::profile("p1").scope_key(), "p1");
        let empty = ScopeSelector {
            profile_id: Some(String::new()),
            source_ids: None,
        };
        assert_eq!(empty.scope_key(), MASTER_SCOPE);
    }

    #[test]
    fn test_job_staleness() {
        let mut job = GenerationJob::new(ScopeSelector::master(), GenerationFilters::default());
        let now = Utc::now();
        assert!(!job.is_stale(now, chrono::Duration::minutes(5)));
        job.started_at = now - chrono::Duration::minutes(6);
        assert!(job.is_stale(now, chrono::Duration::minutes(5)));
    }

    #[test]
    fn test_poll_status_wire_shape() {
        let json = serde_json::to_value(PollStatus::Absent).unwrap();
        assert_eq!(json, serde_json::json!({"status": "absent"}));
    }

    #[test]
    fn test_visual_signals_channel_mapping() {
        let visual = VisualSignals {
            mood_keywords: vec!["Serene".to_string()],
            dominant_colors: vec!["sage".to_string()],
            ..Default::default()
        };
        let mut graph = TagGraph::new();
        graph.merge_signals(&visual.to_tag_signals());
        assert_eq!(graph.themes.get("serene"), Some(&1));
        assert_eq!(graph.colors.get("sage"), Some(&1));
    }
}
