//! The contract between the crawl core and per-site extractors
//!
//! A handler receives the parsed response body and the request that produced
//! it, and returns an [`Extraction`]: products found, follow-up requests, and
//! optionally the counts the pagination planner needs.

use crate::crawler::item::Item;
use crate::crawler::request::Request;
use scraper::Html;
use thiserror::Error;

/// Errors raised while reading a fetched page
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Body is not valid UTF-8")]
    Encoding,

    #[error("Invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected {expected} document, got {actual}")]
    WrongFormat {
        expected: BodyFormat,
        actual: BodyFormat,
    },

    #[error("Missing expected element: {0}")]
    Missing(String),

    #[error("Malformed value for {field}: {value}")]
    Malformed { field: String, value: String },
}

/// How a handler wants its response body parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Html,
    Json,
}

impl std::fmt::Display for BodyFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Html => f.write_str("HTML"),
            Self::Json => f.write_str("JSON"),
        }
    }
}

/// A parsed response body
pub enum Document {
    Html(Html),
    Json(serde_json::Value),
}

impl Document {
    /// Parses a raw body in the requested format
    pub fn parse(body: &[u8], format: BodyFormat) -> Result<Self, ExtractError> {
        match format {
            BodyFormat::Html => {
                let text = std::str::from_utf8(body).map_err(|_| ExtractError::Encoding)?;
                Ok(Self::Html(Html::parse_document(text)))
            }
            BodyFormat::Json => Ok(Self::Json(serde_json::from_slice(body)?)),
        }
    }

    pub fn format(&self) -> BodyFormat {
        match self {
            Self::Html(_) => BodyFormat::Html,
            Self::Json(_) => BodyFormat::Json,
        }
    }

    pub fn as_html(&self) -> Result<&Html, ExtractError> {
        match self {
            Self::Html(html) => Ok(html),
            other => Err(ExtractError::WrongFormat {
                expected: BodyFormat::Html,
                actual: other.format(),
            }),
        }
    }

    pub fn as_json(&self) -> Result<&serde_json::Value, ExtractError> {
        match self {
            Self::Json(value) => Ok(value),
            other => Err(ExtractError::WrongFormat {
                expected: BodyFormat::Json,
                actual: other.format(),
            }),
        }
    }
}

/// Counts a listing page reports about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCounts {
    /// Items actually present on this page
    pub observed: u64,

    /// Total items the listing claims to contain
    pub reported_total: u64,

    /// Category identifier for building synthetic page URLs
    pub category_id: Option<String>,
}

/// What a handler found on one page
#[derive(Debug, Default)]
pub struct Extraction {
    pub items: Vec<Item>,
    pub requests: Vec<Request>,
    pub pagination: Option<PageCounts>,
}

impl Extraction {
    pub fn requests(requests: Vec<Request>) -> Self {
        Self {
            requests,
            ..Self::default()
        }
    }

    pub fn items(items: Vec<Item>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn with_pagination(mut self, counts: PageCounts) -> Self {
        self.pagination = Some(counts);
        self
    }
}
