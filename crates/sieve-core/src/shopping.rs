//! Shopping search links for generated items.

use serde::{Deserialize, Serialize};

/// Search URLs for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingLinks {
    pub amazon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etsy: Option<String>,
    pub google: String,
}

impl ShoppingLinks {
    /// Build links for a product.
    ///
    /// Amazon searches `search_query` (falling back to `name`), Google
    /// Shopping searches `"<name> buy"`, and an Etsy link is added only when
    /// an Etsy-specific query is given.
    pub fn build(name: &str, search_query: Option<&str>, etsy_query: Option<&str>) -> Self {
        let query = search_query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(name);
        let etsy = etsy_query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("https://www.etsy.com/search?q={}", urlencoding::encode(q)));
        Self {
            amazon: format!("https://www.amazon.com/s?k={}", urlencoding::encode(query)),
            etsy,
            google: format!(
                "https://www.google.com/search?q={}&tbm=shop",
                urlencoding::encode(&format!("{} buy", name))
            ),
        }
    }
}
