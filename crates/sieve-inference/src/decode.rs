//! Typed decoders for generator replies.
//!
//! Each decoder extracts JSON with [`parse_structured`] and then reads it
//! leniently: unknown keys are ignored, missing lists are empty, and both
//! `snake_case` and `camelCase` spellings are accepted.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use sieve_core::{
    EmergentConcept, Error, ProductIdea, RecommendationItem, Result, ShoppingLinks, TagSignals,
    VisualSignals,
};

use crate::structured::{parse_structured, Shape};

/// Seven-channel signal object from a signal-extraction reply.
pub fn parse_signals(raw: &str) -> Result<TagSignals> {
    let value = parse_structured(raw, Shape::Object)?;
    Ok(TagSignals::from_json(&value))
}

/// Recommendation items from a recommendation reply.
///
/// Array entries that are not objects or lack a name are skipped. A reply
/// with no usable entry at all is a parse error.
pub fn parse_recommendations(
    raw: &str,
    profile_id: Option<&str>,
    generated_at: DateTime<Utc>,
) -> Result<Vec<RecommendationItem>> {
    let value = parse_structured(raw, Shape::Array)?;
    let entries = value.as_array().map(Vec::as_slice).unwrap_or_default();

    let items: Vec<RecommendationItem> = entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| recommendation_from(obj, profile_id, generated_at))
        .collect();

    if items.len() < entries.len() {
        debug!(
            subsystem = "inference",
            component = "decode",
            skipped = entries.len() - items.len(),
            "Skipped malformed recommendation entries"
        );
    }

    if items.is_empty() {
        return Err(Error::ResponseParse {
            raw_text: raw.to_string(),
        });
    }
    Ok(items)
}

fn recommendation_from(
    obj: &Map<String, Value>,
    profile_id: Option<&str>,
    generated_at: DateTime<Utc>,
) -> Option<RecommendationItem> {
    let name = text_field(obj, &["name"])?;
    let search_query = text_field(obj, &["search_query", "searchQuery"]);
    let etsy_search = text_field(obj, &["etsy_search", "etsySearch"])
        .filter(|q| !q.eq_ignore_ascii_case("null"));
    let links = ShoppingLinks::build(&name, search_query.as_deref(), etsy_search.as_deref());

    Some(RecommendationItem {
        id: Uuid::now_v7().to_string(),
        description: text_field(obj, &["description"]).unwrap_or_default(),
        price_range: text_field(obj, &["price_range", "priceRange"]).unwrap_or_default(),
        category: text_field(obj, &["category"]).unwrap_or_default(),
        match_reason: text_field(obj, &["match_reason", "matchReason"]).unwrap_or_default(),
        search_query,
        links,
        generated_at,
        profile_id: profile_id.map(str::to_string),
        name,
    })
}

/// Visual signals and product ideas from a visual-analysis reply.
pub fn parse_visual_signals(raw: &str) -> Result<VisualSignals> {
    let value = parse_structured(raw, Shape::Object)?;
    let obj = value.as_object().cloned().unwrap_or_default();

    Ok(VisualSignals {
        visual_aesthetics: string_list(&obj, &["visualAesthetics", "visual_aesthetics"]),
        product_categories: string_list(&obj, &["productCategories", "product_categories"]),
        lifestyle_signals: string_list(&obj, &["lifestyleSignals", "lifestyle_signals"]),
        product_ideas: product_ideas(
            &obj,
            &["specificProductIdeas", "specific_product_ideas", "productIdeas"],
        ),
        dominant_colors: string_list(&obj, &["dominantColors", "dominant_colors"]),
        mood_keywords: string_list(&obj, &["moodKeywords", "mood_keywords"]),
    })
}

/// Emergent concept from a tag-combination reply.
pub fn parse_concept(raw: &str) -> Result<EmergentConcept> {
    let value = parse_structured(raw, Shape::Object)?;
    let obj = value.as_object().cloned().unwrap_or_default();

    Ok(EmergentConcept {
        combined_concept: text_field(&obj, &["combinedConcept", "combined_concept"])
            .unwrap_or_default(),
        description: text_field(&obj, &["description"]).unwrap_or_default(),
        emergent_tags: string_list(&obj, &["emergentTags", "emergent_tags"]),
        gift_ideas: product_ideas(&obj, &["giftIdeas", "gift_ideas"]),
        mood_board: string_list(&obj, &["moodBoard", "mood_board"]),
    })
}

/// Product ideas under the first present key.
///
/// Ideas get an Etsy link searching the same query as Amazon.
fn product_ideas(obj: &Map<String, Value>, keys: &[&str]) -> Vec<ProductIdea> {
    first_present(obj, keys)
        .and_then(Value::as_array)
        .map(|ideas| {
            ideas
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|idea| {
                    let name = text_field(idea, &["name"])?;
                    let search_query = text_field(idea, &["searchQuery", "search_query"]);
                    let query = search_query.clone().unwrap_or_else(|| name.clone());
                    Some(ProductIdea {
                        links: ShoppingLinks::build(&name, Some(&query), Some(&query)),
                        description: text_field(idea, &["description"]).unwrap_or_default(),
                        price_range: text_field(idea, &["priceRange", "price_range"]),
                        search_query,
                        name,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

/// Trimmed, non-empty string (or stringified number) under the first present key.
fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    let text = match first_present(obj, keys)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn string_list(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    first_present(obj, keys)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_core::{Channel, TagGraph};

    #[test]
    fn test_signal_reply_merges_with_normalization() {
        let signals = parse_signals(r#"{"themes":["cozy","cozy"," Cozy "]}"#).unwrap();
        let mut graph = TagGraph::new();
        graph.merge_signals(&signals);
        assert_eq!(graph.weight(Channel::Themes, "cozy"), 3);
    }

    #[test]
    fn test_truncated_recommendations_yield_complete_items() {
        let raw = r#"[{"name":"Mug","price_range":"$10"},{"name":"Vase","price_r"#;
        let items = parse_recommendations(raw, Some("p1"), Utc::now()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Mug");
        assert_eq!(items[0].price_range, "$10");
        assert_eq!(items[0].profile_id.as_deref(), Some("p1"));
        assert_eq!(items[0].links.amazon, "https://www.amazon.com/s?k=Mug");
    }

    #[test]
    fn test_recommendations_skip_nameless_and_non_objects() {
        let raw = r#"[
            "just a string",
            {"description":"no name"},
            {"name":"  "},
            {"name":"Lamp","priceRange":"$40","search_query":"brass lamp","etsy_search":"null"},
            {"name":"Throw","etsySearch":"wool throw"}
        ]"#;
        let items = parse_recommendations(raw, None, Utc::now()).unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Lamp", "Throw"]);
        assert_eq!(items[0].price_range, "$40");
        assert_eq!(items[0].search_query.as_deref(), Some("brass lamp"));
        assert!(items[0].links.etsy.is_none());
        assert_eq!(
            items[1].links.etsy.as_deref(),
            Some("https://www.etsy.com/search?q=wool%20throw")
        );
        assert_ne!(items[0].id, items[1].id);
    }

    #[test]
    fn test_recommendations_with_no_usable_entry_fail() {
        let err = parse_recommendations(r#"[{"description":"x"}]"#, None, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::ResponseParse { .. }));
    }

    #[test]
    fn test_visual_reply_decodes_ideas_and_folds_into_graph() {
        let raw = r#"Here is what I see:
        {"visualAesthetics":["Rustic"],"productCategories":["ceramics"],
         "specificProductIdeas":[{"name":"Stoneware Mug","priceRange":"$25"},{"description":"x"}],
         "dominantColors":["terracotta"],"moodKeywords":["calm"]}"#;
        let visual = parse_visual_signals(raw).unwrap();
        assert_eq!(visual.product_ideas.len(), 1);
        let idea = &visual.product_ideas[0];
        assert_eq!(idea.price_range.as_deref(), Some("$25"));
        assert_eq!(
            idea.links.etsy.as_deref(),
            Some("https://www.etsy.com/search?q=Stoneware%20Mug")
        );

        let mut graph = TagGraph::new();
        graph.merge_signals(&visual.to_tag_signals());
        assert_eq!(graph.weight(Channel::Aesthetics, "rustic"), 1);
        assert_eq!(graph.weight(Channel::Themes, "calm"), 1);
        assert_eq!(graph.weight(Channel::Colors, "terracotta"), 1);
    }

    #[test]
    fn test_concept_reply() {
        let raw = r#"{"combinedConcept":"Slow Mornings","description":"Unhurried rituals",
            "emergentTags":["ritual"],"giftIdeas":[{"name":"Pour-over Set","searchQuery":"ceramic pour over"}],
            "moodBoard":["steam","linen"]}"#;
        let concept = parse_concept(raw).unwrap();
        assert_eq!(concept.combined_concept, "Slow Mornings");
        assert_eq!(concept.emergent_tags, vec!["ritual"]);
        assert_eq!(concept.gift_ideas[0].search_query.as_deref(), Some("ceramic pour over"));
        assert_eq!(concept.mood_board.len(), 2);
    }

    #[test]
    fn test_signal_reply_without_json_is_parse_error() {
        assert!(matches!(
            parse_signals("sorry, no idea").unwrap_err(),
            Error::ResponseParse { .. }
        ));
    }
}
