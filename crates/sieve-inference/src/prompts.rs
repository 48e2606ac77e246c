//! Prompt builders for the four generation tasks.
//!
//! Every builder is pure: it turns domain values into a
//! [`GenerationRequest`] and never touches the network.

use sieve_core::defaults::{
    COMBINE_CONTEXT_PER_CHANNEL, COMBINE_MAX_TOKENS, RECOMMENDATION_COUNT, RECOMMEND_MAX_TOKENS,
    SIGNAL_MAX_TOKENS, TOP_TAGS_PER_CHANNEL, VISUAL_IMAGE_CAP, VISUAL_MAX_TOKENS,
};
use sieve_core::{Channel, Descriptor, GenerationFilters, GenerationRequest, PromptPart, TagGraph};

pub const SIGNAL_SYSTEM_PROMPT: &str = "You extract aesthetic taste and preference signals from \
saved-content metadata for gift recommendation purposes. Always respond with only valid JSON.";

pub const VISUAL_SYSTEM_PROMPT: &str = "You are a visual taste analyst helping curate \
personalized gift ideas from saved imagery. Always respond with only valid JSON.";

pub const RECOMMEND_SYSTEM_PROMPT: &str = "You are a thoughtful, creative gift curator who \
matches gifts to personal taste profiles derived from saved collections. Always respond with \
valid JSON only.";

pub const COMBINE_SYSTEM_PROMPT: &str = "You are a creative taste analyst who finds unexpected \
and delightful connections between aesthetic preferences. Always respond with valid JSON.";

const SIGNAL_TEMPLATE: &str =
    r#"{"themes":[],"aesthetics":[],"categories":[],"lifestyle":[],"interests":[],"colors":[],"keywords":[]}"#;

/// Signal extraction over one batch of descriptors.
pub fn signal_prompt(descriptors: &[Descriptor]) -> GenerationRequest {
    let lines = descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| {
            format!(
                "Item {}: title=\"{}\", alt=\"{}\", url=\"{}\"",
                i + 1,
                d.title,
                d.alt,
                d.url
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        r#"Analyze these saved items and extract taste/preference signals.

Items:
{}

Respond ONLY with valid JSON (no markdown, no extra text):
{}
"#,
        lines, SIGNAL_TEMPLATE
    );

    GenerationRequest::text(SIGNAL_SYSTEM_PROMPT, prompt, SIGNAL_MAX_TOKENS)
}

/// Visual analysis over the first images with fetchable URLs.
///
/// `data:` URLs are skipped and at most [`VISUAL_IMAGE_CAP`] images are
/// sent. Returns `None` when no descriptor carries a usable image.
pub fn visual_prompt(descriptors: &[Descriptor]) -> Option<GenerationRequest> {
    let with_images: Vec<(&Descriptor, &str)> = descriptors
        .iter()
        .filter_map(|d| {
            let url = d.image_url.as_deref()?.trim();
            (!url.is_empty() && !url.starts_with("data:")).then_some((d, url))
        })
        .take(VISUAL_IMAGE_CAP)
        .collect();

    if with_images.is_empty() {
        return None;
    }

    let mut request = GenerationRequest {
        system: VISUAL_SYSTEM_PROMPT.to_string(),
        parts: Vec::with_capacity(with_images.len() * 2 + 1),
        max_output_tokens: VISUAL_MAX_TOKENS,
    };

    for (descriptor, url) in with_images {
        let title = [descriptor.title.trim(), descriptor.alt.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or("(no title)");
        request = request
            .with_part(PromptPart::ImageUrl(url.to_string()))
            .with_part(PromptPart::Text(format!("Title: {}", title)));
    }

    Some(request.with_part(PromptPart::Text(
        r#"Based on these images and their titles, analyze:
- Visual aesthetics (color palettes, textures, moods, design styles)
- Specific product categories visible or implied
- Lifestyle signals
- Concrete gift ideas this person would love

Respond ONLY with valid JSON:
{
  "visualAesthetics": ["..."],
  "productCategories": ["..."],
  "lifestyleSignals": ["..."],
  "specificProductIdeas": [
    { "name": "...", "description": "...", "searchQuery": "...", "priceRange": "..." }
  ],
  "dominantColors": ["..."],
  "moodKeywords": ["..."]
}"#
        .to_string(),
    )))
}

/// Per-channel "Label: a, b, c" lines for the top tags of a graph.
pub fn taste_summary(graph: &TagGraph, per_channel: usize) -> String {
    graph
        .summary(per_channel)
        .into_iter()
        .map(|(channel, tags)| format!("{}: {}", channel.label(), tags.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn filter_clause(filters: &GenerationFilters) -> String {
    let mut clause = String::new();
    if let Some(occasion) = filters.occasion() {
        clause.push_str(&format!(" for {}", occasion));
    }
    if let Some(budget) = filters.budget() {
        clause.push_str(&format!(", budget: {}", budget));
    }
    if let Some(age) = filters.recipient_age() {
        clause.push_str(&format!(", recipient: {}", age));
    }
    clause
}

/// Recommendation request for exactly [`RECOMMENDATION_COUNT`] items.
pub fn recommendation_prompt(graph: &TagGraph, filters: &GenerationFilters) -> GenerationRequest {
    let prompt = format!(
        r#"Based on this person's taste profile:

{}

Suggest {} specific, creative gift ideas{}.

Each gift should feel personally curated, not generic. Think about what someone with this exact taste profile would genuinely love.

Respond ONLY with a valid JSON array of exactly {} objects:
[{{
  "name": "...",
  "description": "...",
  "price_range": "...",
  "category": "...",
  "match_reason": "why this fits their taste",
  "search_query": "specific search terms",
  "etsy_search": "etsy-specific query or null"
}}]
"#,
        taste_summary(graph, TOP_TAGS_PER_CHANNEL),
        RECOMMENDATION_COUNT,
        filter_clause(filters),
        RECOMMENDATION_COUNT
    );

    GenerationRequest::text(RECOMMEND_SYSTEM_PROMPT, prompt, RECOMMEND_MAX_TOKENS)
}

/// Emergent-concept request for a set of selected tags.
///
/// Context lists the first tags of every channel in stored (alphabetical)
/// order, not by weight.
pub fn combination_prompt(selected: &[String], graph: &TagGraph) -> GenerationRequest {
    let context = Channel::ALL
        .iter()
        .map(|c| {
            let tags: Vec<&str> = graph
                .channel(*c)
                .keys()
                .take(COMBINE_CONTEXT_PER_CHANNEL)
                .map(String::as_str)
                .collect();
            format!("{}: {}", c.as_str(), tags.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        r#"A user is exploring their taste profile and has selected these tags to combine:
Tags selected: {}

Their broader taste graph context:
{}

Generate creative new concepts, gift ideas, or taste descriptors that emerge from combining these tags together. Think laterally and creatively.

Respond ONLY with valid JSON:
{{
  "combinedConcept": "a poetic name for this combination",
  "description": "what this taste combination says about the person",
  "emergentTags": ["new tag ideas that emerge from the combination"],
  "giftIdeas": [
    {{ "name": "...", "description": "...", "searchQuery": "...", "priceRange": "..." }}
  ],
  "moodBoard": ["evocative words that capture this vibe"]
}}
"#,
        selected.join(", "),
        context
    );

    GenerationRequest::text(COMBINE_SYSTEM_PROMPT, prompt, COMBINE_MAX_TOKENS)
}
