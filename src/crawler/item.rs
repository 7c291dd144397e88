//! Product records emitted by the crawl

use serde::{Deserialize, Serialize};

/// A flat product record
///
/// `item_id` is the deduplication key: it must be the same every time the
/// same product is fetched, regardless of which listing page it appears on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub item_id: String,
    pub item_name: String,
    pub item_url: String,
    pub img: Option<String>,
    pub current_price: Option<f64>,
    pub original_price: Option<f64>,
    pub currency: String,
    pub discounted: bool,
    pub use_unit_price: bool,
    pub current_unit_price: Option<f64>,
    pub original_unit_price: Option<f64>,
    pub unit: Option<String>,
    pub bread_crumbs: String,
    pub in_stock: bool,
}

impl Item {
    /// Creates an item with the identifying fields set and everything else empty
    pub fn new(
        item_id: impl Into<String>,
        item_name: impl Into<String>,
        item_url: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            item_name: item_name.into(),
            item_url: item_url.into(),
            img: None,
            current_price: None,
            original_price: None,
            currency: "CZK".to_string(),
            discounted: false,
            use_unit_price: false,
            current_unit_price: None,
            original_unit_price: None,
            unit: None,
            bread_crumbs: String::new(),
            in_stock: true,
        }
    }
}

/// Parses a displayed price such as `1 299,90 Kč` or `12.90` into a number
///
/// Thousands separators (spaces, non-breaking spaces) and currency text are
/// dropped; a decimal comma is accepted.
///
/// # Examples
///
/// ```
/// use catalog_crawler::crawler::clean_price;
///
/// assert_eq!(clean_price("1 299,90 Kč"), Some(1299.90));
/// assert_eq!(clean_price("zdarma"), None);
/// ```
pub fn clean_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.' || *c == '-')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '-');
    if cleaned.is_empty() {
        return None;
    }

    cleaned.parse::<f64>().ok()
}
