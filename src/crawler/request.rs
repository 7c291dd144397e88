//! Crawl requests and the labels that route them

use crate::url::normalize_url;
use crate::UrlError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Closed set of tags selecting which handler processes a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    /// Site entry page listing top-level categories
    Start,

    /// A category: either a listing of subcategories or the first page of products
    Category,

    /// A follow-up page of a product listing
    Page,
}

impl Label {
    /// Every label, in declaration order
    pub const ALL: [Label; 3] = [Label::Start, Label::Category, Label::Page];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Category => "category",
            Self::Page => "page",
        }
    }

}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request context carried from the request's creator to its handler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    /// Page number within a paginated listing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Page size the listing was requested with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,

    /// Category names from the catalog root down to this listing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category_path: Vec<String>,
}

/// A unit of crawl work. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    url: String,
    label: Label,
    headers: BTreeMap<String, String>,
    user_data: UserData,
}

impl Request {
    pub fn new(url: impl Into<String>, label: Label) -> Self {
        Self {
            url: url.into(),
            label,
            headers: BTreeMap::new(),
            user_data: UserData::default(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_user_data(mut self, user_data: UserData) -> Self {
        self.user_data = user_data;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn user_data(&self) -> &UserData {
        &self.user_data
    }

    /// Identity used to suppress repeated work within a run
    ///
    /// # Returns
    ///
    /// * `Ok(RequestKey)` - The normalized URL paired with the label
    /// * `Err(UrlError)` - The URL cannot be normalized
    pub fn key(&self) -> Result<RequestKey, UrlError> {
        let normalized = normalize_url(&self.url)?;
        Ok(RequestKey {
            url: normalized.into(),
            label: self.label,
        })
    }
}

/// Normalized URL plus label
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    url: String,
    label: Label,
}
