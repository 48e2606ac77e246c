//! Tag-overlap similarity between sources.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::Source;

/// Jaccard index `|A∩B| / |A∪B|`; 0 when either set is empty.
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Similarity score for one pair of sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePairSimilarity {
    pub source_a: String,
    pub source_b: String,
    pub score: f64,
}

/// Rank every pair of sources by tag overlap, highest first.
///
/// Pairs with equal scores keep their input order.
pub fn rank_source_pairs(sources: &[Source]) -> Vec<SourcePairSimilarity> {
    let tag_sets: Vec<(&str, BTreeSet<String>)> = sources
        .iter()
        .map(|s| (s.id.as_str(), s.graph.tag_set()))
        .collect();

    let mut pairs = Vec::new();
    for i in 0..tag_sets.len() {
        for j in (i + 1)..tag_sets.len() {
            pairs.push(SourcePairSimilarity {
                source_a: tag_sets[i].0.to_string(),
                source_b: tag_sets[j].0.to_string(),
                score: jaccard(&tag_sets[i].1, &tag_sets[j].1),
            });
        }
    }
    pairs.sort_by(|a, b| b.score.total_cmp(&a.score));
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TagSignals;
    use crate::models::{Source, SourceMeta};

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn source(name: &str, themes: &[&str]) -> Source {
        let mut s = Source::new(
            name.to_string(),
            &SourceMeta {
                name: name.to_string(),
                url: String::new(),
            },
        );
        s.graph.merge_signals(&TagSignals::new().with("themes", themes));
        s
    }

    #[test]
    fn test_jaccard_half_overlap() {
        assert_eq!(jaccard(&set(&["a", "b", "c"]), &set(&["b", "c", "d"])), 0.5);
    }

    #[test]
    fn test_jaccard_empty_is_zero() {
        assert_eq!(jaccard(&set(&[]), &set(&["x"])), 0.0);
        assert_eq!(jaccard(&set(&[]), &set(&[])), 0.0);
    }

    #[test]
    fn test_jaccard_identical_is_one() {
        assert_eq!(jaccard(&set(&["x", "y"]), &set(&["y", "x"])), 1.0);
    }

    #[test]
    fn test_rank_source_pairs_orders_by_score() {
        let sources = vec![
            source("kitchen", &["ceramics", "linen"]),
            source("garden", &["plants", "terracotta"]),
            source("studio", &["ceramics", "linen", "glaze"]),
        ];
        let pairs = rank_source_pairs(&sources);
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].source_a, "kitchen");
        assert_eq!(pairs[0].source_b, "studio");
        assert!((pairs[0].score - 2.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(pairs[2].score, 0.0);
    }

    #[test]
    fn test_rank_source_pairs_needs_two_sources() {
        assert!(rank_source_pairs(&[source("solo", &["a"])]).is_empty());
    }
}
