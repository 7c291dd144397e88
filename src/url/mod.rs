//! URL handling module for Catalog-Crawler
//!
//! This module provides URL normalization (used for request identity) and the
//! small query/path helpers the pagination planner and extractors share.

mod normalize;

use crate::UrlError;
use url::Url;

// Re-export main functions
pub use normalize::normalize_url;

/// Returns a copy of `url` with query parameter `key` set to `value`
///
/// Existing occurrences of the key are replaced; other parameters keep their order.
///
/// # Examples
///
/// ```
/// use catalog_crawler::url::with_query_param;
///
/// let next = with_query_param("https://example.com/api?pageSize=500&page=0", "page", "1").unwrap();
/// assert_eq!(next.as_str(), "https://example.com/api?pageSize=500&page=1");
/// ```
pub fn with_query_param(url: &str, key: &str, value: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url).map_err(|e| UrlError::Parse(e.to_string()))?;

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut replaced = false;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &retained {
            if k == key {
                if !replaced {
                    pairs.append_pair(k, value);
                    replaced = true;
                }
            } else {
                pairs.append_pair(k, v);
            }
        }
        if !replaced {
            pairs.append_pair(key, value);
        }
    }

    Ok(url)
}

/// Returns the last non-empty path segment of a URL, if any
pub fn last_path_segment(url: &Url) -> Option<&str> {
    url.path_segments()?.filter(|s| !s.is_empty()).last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_query_param_replaces_existing() {
        let url = with_query_param("https://example.com/api?page=0&pageSize=500", "page", "3")
            .unwrap();
        assert_eq!(url.as_str(), "https://example.com/api?page=3&pageSize=500");
    }

    #[test]
    fn test_with_query_param_appends_missing() {
        let url = with_query_param("https://example.com/api", "page", "1").unwrap();
        assert_eq!(url.as_str(), "https://example.com/api?page=1");
    }

    #[test]
    fn test_with_query_param_collapses_repeats() {
        let url = with_query_param("https://example.com/api?page=0&page=7", "page", "1").unwrap();
        assert_eq!(url.as_str(), "https://example.com/api?page=1");
    }

    #[test]
    fn test_with_query_param_invalid_url() {
        assert!(with_query_param("not a url", "page", "1").is_err());
    }

    #[test]
    fn test_last_path_segment() {
        let url = Url::parse("https://shop.billa.cz/produkty/ovoce-a-zelenina-1165/").unwrap();
        assert_eq!(last_path_segment(&url), Some("ovoce-a-zelenina-1165"));

        let root = Url::parse("https://shop.billa.cz/").unwrap();
        assert_eq!(last_path_segment(&root), None);
    }
}
