//! Per-site extractors
//!
//! Each site module builds a [`Router`] whose handlers turn a fetched page
//! into products and follow-up requests. The site is chosen by
//! `site.name` in the configuration.
//!
//! | Site | Start page | Listings | Pagination |
//! |------|------------|----------|------------|
//! | `billa` | HTML category cards | JSON category API | counted total |
//! | `kaufland` | HTML footer categories | HTML category tree and product tiles | derived page count |

pub mod billa;
pub mod kaufland;

use crate::config::SiteConfig;
use crate::crawler::{ExtractError, Router};
use crate::ConfigError;
use scraper::{ElementRef, Selector};

/// Names of the sites with an extractor
pub const SITES: [&str; 2] = [billa::NAME, kaufland::NAME];

/// Builds the router for the configured site
///
/// # Returns
///
/// * `Ok(Router)` - The site's routing table
/// * `Err(ConfigError::UnknownSite)` - No extractor exists for `site.name`
/// * `Err(ConfigError::Routing)` - The site's table or pagination settings are inconsistent
pub fn router_for(site: &SiteConfig) -> Result<Router, ConfigError> {
    match site.name.as_str() {
        billa::NAME => billa::router(site),
        kaufland::NAME => kaufland::router(site),
        other => Err(ConfigError::UnknownSite(format!(
            "{} (known sites: {})",
            other,
            SITES.join(", ")
        ))),
    }
}

/// Parses a CSS selector used by an extractor
pub(crate) fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Malformed {
        field: "selector".to_string(),
        value: format!("{} ({})", css, e),
    })
}

/// Trimmed text content of an element
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Base URL from configuration, without a trailing slash
pub(crate) fn base_url(site: &SiteConfig, default: &str) -> String {
    site.base_url
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}
