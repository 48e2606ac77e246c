//! Weighted taste graph: channels of normalized tags with occurrence weights.
//!
//! A [`TagGraph`] holds one ordered map per [`Channel`]. Weights only grow
//! under [`TagGraph::merge_signals`] and [`TagGraph::absorb`], and both are
//! plain per-key addition, so merging is commutative and associative: the
//! same batches produce the same graph no matter the order they arrive in.
//!
//! Maps are `BTreeMap` so iteration, serialization and `top_k` tie-breaking
//! are deterministic.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Tag → weight map for a single channel.
pub type ChannelWeights = BTreeMap<String, u64>;

/// One named category of tags within a [`TagGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Themes,
    Aesthetics,
    Categories,
    Lifestyle,
    Interests,
    Colors,
    Keywords,
}

impl Channel {
    /// All channels, in canonical order.
    pub const ALL: [Channel; 7] = [
        Channel::Themes,
        Channel::Aesthetics,
        Channel::Categories,
        Channel::Lifestyle,
        Channel::Interests,
        Channel::Colors,
        Channel::Keywords,
    ];

    /// Wire name of the channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Themes => "themes",
            Channel::Aesthetics => "aesthetics",
            Channel::Categories => "categories",
            Channel::Lifestyle => "lifestyle",
            Channel::Interests => "interests",
            Channel::Colors => "colors",
            Channel::Keywords => "keywords",
        }
    }

    /// Human-readable label used in prompt summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Themes => "Themes",
            Channel::Aesthetics => "Aesthetics",
            Channel::Categories => "Categories",
            Channel::Lifestyle => "Lifestyle",
            Channel::Interests => "Interests",
            Channel::Colors => "Colors",
            Channel::Keywords => "Keywords",
        }
    }

    /// Parse a channel name from untrusted input. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Channel> {
        match name.trim().to_lowercase().as_str() {
            "themes" => Some(Channel::Themes),
            "aesthetics" => Some(Channel::Aesthetics),
            "categories" => Some(Channel::Categories),
            "lifestyle" => Some(Channel::Lifestyle),
            "interests" => Some(Channel::Interests),
            "colors" => Some(Channel::Colors),
            "keywords" => Some(Channel::Keywords),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::parse(s).ok_or_else(|| format!("Unknown channel: {}", s))
    }
}

/// Normalize a raw tag: trim and lower-case. Empty results are dropped.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let tag = raw.trim().to_lowercase();
    if tag.is_empty() {
        None
    } else {
        Some(tag)
    }
}

/// Generator-produced channel → tag list mapping, before normalization.
///
/// Keys are kept verbatim; unknown channel names are ignored at merge time
/// rather than rejected here, since the producer is untrusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSignals(pub BTreeMap<String, Vec<String>>);

impl TagSignals {
    /// Create an empty signal set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper to add a channel list.
    pub fn with(mut self, channel: impl Into<String>, tags: &[&str]) -> Self {
        self.0
            .entry(channel.into())
            .or_default()
            .extend(tags.iter().map(|t| t.to_string()));
        self
    }

    /// Append tags to a channel list.
    pub fn push(&mut self, channel: Channel, tags: impl IntoIterator<Item = String>) {
        self.0
            .entry(channel.as_str().to_string())
            .or_default()
            .extend(tags);
    }

    /// Build signals leniently from an arbitrary JSON value.
    ///
    /// Only array-valued keys of an object are kept. String items are taken
    /// as-is, numbers and booleans are stringified, everything else dropped.
    pub fn from_json(value: &JsonValue) -> Self {
        let mut signals = BTreeMap::new();
        if let JsonValue::Object(map) = value {
            for (key, items) in map {
                if let JsonValue::Array(items) = items {
                    let tags: Vec<String> = items.iter().filter_map(json_item_to_tag).collect();
                    signals.insert(key.clone(), tags);
                }
            }
        }
        Self(signals)
    }

    /// Total raw occurrences across all keys.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn json_item_to_tag(item: &JsonValue) -> Option<String> {
    match item {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Weighted-tag container with a fixed set of channels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagGraph {
    #[serde(default)]
    pub themes: ChannelWeights,
    #[serde(default)]
    pub aesthetics: ChannelWeights,
    #[serde(default)]
    pub categories: ChannelWeights,
    #[serde(default)]
    pub lifestyle: ChannelWeights,
    #[serde(default)]
    pub interests: ChannelWeights,
    #[serde(default)]
    pub colors: ChannelWeights,
    #[serde(default)]
    pub keywords: ChannelWeights,
}

impl TagGraph {
    /// An all-empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Weights for one channel.
    pub fn channel(&self, channel: Channel) -> &ChannelWeights {
        match channel {
            Channel::Themes => &self.themes,
            Channel::Aesthetics => &self.aesthetics,
            Channel::Categories => &self.categories,
            Channel::Lifestyle => &self.lifestyle,
            Channel::Interests => &self.interests,
            Channel::Colors => &self.colors,
            Channel::Keywords => &self.keywords,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut ChannelWeights {
        match channel {
            Channel::Themes => &mut self.themes,
            Channel::Aesthetics => &mut self.aesthetics,
            Channel::Categories => &mut self.categories,
            Channel::Lifestyle => &mut self.lifestyle,
            Channel::Interests => &mut self.interests,
            Channel::Colors => &mut self.colors,
            Channel::Keywords => &mut self.keywords,
        }
    }

    /// Weight of a tag in a channel (0 when absent).
    pub fn weight(&self, channel: Channel, tag: &str) -> u64 {
        normalize_tag(tag)
            .and_then(|t| self.channel(channel).get(&t).copied())
            .unwrap_or(0)
    }

    /// Fold signals in, adding 1 per non-empty normalized occurrence.
    pub fn merge_signals(&mut self, signals: &TagSignals) {
        self.merge_signals_weighted(signals, 1);
    }

    /// Fold signals in with a caller-supplied increment per occurrence.
    ///
    /// Unrecognized channel names are skipped.
    pub fn merge_signals_weighted(&mut self, signals: &TagSignals, increment: u64) {
        for (name, tags) in &signals.0 {
            let Some(channel) = Channel::parse(name) else {
                tracing::trace!(channel = %name, "Ignoring unrecognized signal channel");
                continue;
            };
            let weights = self.channel_mut(channel);
            for tag in tags.iter().filter_map(|t| normalize_tag(t)) {
                let entry = weights.entry(tag).or_insert(0);
                *entry = entry.saturating_add(increment);
            }
        }
    }

    /// Add every channel/tag weight of `other` into this graph.
    pub fn absorb(&mut self, other: &TagGraph) {
        for channel in Channel::ALL {
            let target = self.channel_mut(channel);
            for (tag, weight) in other.channel(channel) {
                let entry = target.entry(tag.clone()).or_insert(0);
                *entry = entry.saturating_add(*weight);
            }
        }
    }

    /// Set a tag in one channel to a fixed weight.
    ///
    /// Returns the normalized tag, or `None` if it normalized to empty.
    pub fn set_tag(&mut self, channel: Channel, tag: &str, weight: u64) -> Option<String> {
        let tag = normalize_tag(tag)?;
        self.channel_mut(channel).insert(tag.clone(), weight);
        Some(tag)
    }

    /// Delete a tag key from every channel. Returns true if anything was removed.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let Some(tag) = normalize_tag(tag) else {
            return false;
        };
        let mut removed = false;
        for channel in Channel::ALL {
            removed |= self.channel_mut(channel).remove(&tag).is_some();
        }
        removed
    }

    /// Top `k` tags of a channel by weight descending, ties by tag ascending.
    pub fn top_k(&self, channel: Channel, k: usize) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .channel(channel)
            .iter()
            .map(|(t, w)| (t.clone(), *w))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(k);
        entries
    }

    /// Top `k` tag names per channel, skipping empty channels.
    pub fn summary(&self, k: usize) -> Vec<(Channel, Vec<String>)> {
        Channel::ALL
            .iter()
            .map(|c| (*c, self.top_k(*c, k).into_iter().map(|(t, _)| t).collect::<Vec<_>>()))
            .filter(|(_, tags)| !tags.is_empty())
            .collect()
    }

    /// Union of tag keys across all channels.
    pub fn tag_set(&self) -> BTreeSet<String> {
        Channel::ALL
            .iter()
            .flat_map(|c| self.channel(*c).keys().cloned())
            .collect()
    }

    /// Number of (channel, tag) entries.
    pub fn tag_count(&self) -> usize {
        Channel::ALL.iter().map(|c| self.channel(*c).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tag_count() == 0
    }

    /// Per-channel entry counts, for logging.
    pub fn channel_sizes(&self) -> HashMap<Channel, usize> {
        Channel::ALL
            .iter()
            .map(|c| (*c, self.channel(*c).len()))
            .collect()
    }
}

/// Sum the graphs of every item passing `predicate` into a fresh graph.
///
/// Equivalent to repeated [`TagGraph::absorb`], so the result does not depend
/// on iteration order.
pub fn flatten_scope<'a, T, I, F, G>(items: I, graph_of: G, predicate: F) -> TagGraph
where
    T: 'a,
    I: IntoIterator<Item = &'a T>,
    G: Fn(&T) -> &TagGraph,
    F: Fn(&T) -> bool,
{
    let mut acc = TagGraph::new();
    for item in items.into_iter().filter(|i| predicate(i)) {
        acc.absorb(graph_of(item));
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch(tags: &[&str]) -> TagSignals {
        TagSignals::new().with("themes", tags).with("colors", &["sage"])
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("  Cozy "), Some("cozy".to_string()));
        assert_eq!(normalize_tag("   "), None);
        assert_eq!(normalize_tag(""), None);
    }

    #[test]
    fn test_channel_parse_is_lenient() {
        assert_eq!(Channel::parse("Themes"), Some(Channel::Themes));
        assert_eq!(Channel::parse(" colors "), Some(Channel::Colors));
        assert_eq!(Channel::parse("moods"), None);
        assert!("vibes".parse::<Channel>().is_err());
    }

    #[test]
    fn test_merge_counts_each_normalized_occurrence() {
        let signals = TagSignals::from_json(&json!({"themes": ["cozy", "cozy", " Cozy "]}));
        let mut graph = TagGraph::new();
        graph.merge_signals(&signals);
        assert_eq!(graph.themes.get("cozy"), Some(&3));
        assert_eq!(graph.themes.len(), 1);
    }

    #[test]
    fn test_merge_ignores_unknown_channels_and_empty_tags() {
        let signals = TagSignals::from_json(&json!({
            "themes": ["", "   ", "boho"],
            "vibes": ["ignored"],
            "colors": "not-an-array"
        }));
        let mut graph = TagGraph::new();
        graph.merge_signals(&signals);
        assert_eq!(graph.tag_count(), 1);
        assert_eq!(graph.weight(Channel::Themes, "boho"), 1);
    }

    #[test]
    fn test_from_json_stringifies_scalars() {
        let signals = TagSignals::from_json(&json!({"keywords": [1970, true, null, {"x": 1}, "retro"]}));
        assert_eq!(
            signals.0.get("keywords").unwrap(),
            &vec!["1970".to_string(), "true".to_string(), "retro".to_string()]
        );
    }

    #[test]
    fn test_merge_is_order_independent() {
        let batches = [
            batch(&["cozy", "boho"]),
            batch(&["Boho", "minimal"]),
            batch(&["cozy"]),
        ];

        let mut forward = TagGraph::new();
        for b in &batches {
            forward.merge_signals(b);
        }
        let mut reverse = TagGraph::new();
        for b in batches.iter().rev() {
            reverse.merge_signals(b);
        }
        let mut grouped = TagGraph::new();
        let mut tail = TagGraph::new();
        tail.merge_signals(&batches[1]);
        tail.merge_signals(&batches[2]);
        grouped.merge_signals(&batches[0]);
        grouped.absorb(&tail);

        assert_eq!(forward, reverse);
        assert_eq!(forward, grouped);
        assert_eq!(forward.weight(Channel::Themes, "boho"), 2);
        assert_eq!(forward.weight(Channel::Colors, "sage"), 3);
    }

    #[test]
    fn test_weighted_merge_uses_increment() {
        let mut graph = TagGraph::new();
        graph.merge_signals_weighted(&TagSignals::new().with("keywords", &["Pottery"]), 5);
        graph.merge_signals(&TagSignals::new().with("keywords", &["pottery"]));
        assert_eq!(graph.weight(Channel::Keywords, "pottery"), 6);
    }

    #[test]
    fn test_top_k_breaks_ties_lexicographically() {
        let mut graph = TagGraph::new();
        graph.merge_signals(
            &TagSignals::new().with("themes", &["zen", "art", "art", "moody", "zen", "boho"]),
        );
        let top = graph.top_k(Channel::Themes, 3);
        assert_eq!(
            top,
            vec![
                ("art".to_string(), 2),
                ("zen".to_string(), 2),
                ("boho".to_string(), 1)
            ]
        );
        assert!(graph.top_k(Channel::Colors, 8).is_empty());
    }

    #[test]
    fn test_remove_tag_hits_every_channel() {
        let mut graph = TagGraph::new();
        graph.merge_signals(
            &TagSignals::new()
                .with("themes", &["vintage"])
                .with("keywords", &["vintage", "film"]),
        );
        assert!(graph.remove_tag(" Vintage"));
        assert_eq!(graph.tag_set(), BTreeSet::from(["film".to_string()]));
        assert!(!graph.remove_tag("vintage"));
    }

    #[test]
    fn test_set_tag_overwrites_weight() {
        let mut graph = TagGraph::new();
        graph.merge_signals(&TagSignals::new().with("colors", &["rust", "rust"]));
        assert_eq!(graph.set_tag(Channel::Colors, "RUST", 1), Some("rust".to_string()));
        assert_eq!(graph.weight(Channel::Colors, "rust"), 1);
        assert_eq!(graph.set_tag(Channel::Colors, "  ", 1), None);
    }

    #[test]
    fn test_flatten_scope_filters_and_is_idempotent() {
        struct Item {
            enabled: bool,
            graph: TagGraph,
        }
        let mut a = TagGraph::new();
        a.merge_signals(&batch(&["cozy"]));
        let mut b = TagGraph::new();
        b.merge_signals(&batch(&["boho"]));
        let items = vec![
            Item { enabled: true, graph: a },
            Item { enabled: false, graph: b },
        ];

        let first = flatten_scope(&items, |i| &i.graph, |i| i.enabled);
        let second = flatten_scope(&items, |i| &i.graph, |i| i.enabled);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first.weight(Channel::Themes, "cozy"), 1);
        assert_eq!(first.weight(Channel::Themes, "boho"), 0);
    }

    #[test]
    fn test_graph_deserializes_missing_channels() {
        let graph: TagGraph = serde_json::from_value(json!({"themes": {"cozy": 4}})).unwrap();
        assert_eq!(graph.weight(Channel::Themes, "cozy"), 4);
        assert!(graph.keywords.is_empty());
    }

    #[test]
    fn test_summary_skips_empty_channels() {
        let mut graph = TagGraph::new();
        graph.merge_signals(&TagSignals::new().with("interests", &["hiking"]));
        let summary = graph.summary(8);
        assert_eq!(summary, vec![(Channel::Interests, vec!["hiking".to_string()])]);
    }
}
