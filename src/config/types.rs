use crate::crawler::Label;
use serde::Deserialize;

/// Main configuration structure for Catalog-Crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    pub site: SiteConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Total number of fetch attempts per request before it is abandoned
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Ceiling on fetch attempts started per minute
    #[serde(
        rename = "max-requests-per-minute",
        default = "default_max_requests_per_minute"
    )]
    pub max_requests_per_minute: u32,

    /// Maximum number of requests in flight at once
    #[serde(
        rename = "max-concurrent-requests",
        default = "default_max_concurrent_requests"
    )]
    pub max_concurrent_requests: u32,

    /// Delay between attempts of the same request (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Interval between periodic checkpoints of counters and processed ids
    #[serde(
        rename = "checkpoint-interval-secs",
        default = "default_checkpoint_interval_secs"
    )]
    pub checkpoint_interval_secs: u64,

    /// Per-request timeout
    #[serde(
        rename = "request-timeout-secs",
        default = "default_request_timeout_secs"
    )]
    pub request_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_max_requests_per_minute() -> u32 {
    400
}

fn default_max_concurrent_requests() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_checkpoint_interval_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_requests_per_minute: default_max_requests_per_minute(),
            max_concurrent_requests: default_max_concurrent_requests(),
            retry_delay_ms: default_retry_delay_ms(),
            checkpoint_interval_secs: default_checkpoint_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database holding runs, counters and processed ids
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the JSON Lines dataset that emitted items are appended to
    #[serde(rename = "dataset-path")]
    pub dataset_path: String,
}

/// Site selection, entry points and paging arithmetic
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Registered extractor name (e.g., "billa", "kaufland")
    pub name: String,

    /// Overrides the origin the extractor builds absolute URLs against
    #[serde(rename = "base-url", default)]
    pub base_url: Option<String>,

    /// Requests the crawl starts from
    pub start: Vec<StartEntry>,

    /// Page-count policy for the site's listings
    pub pagination: PaginationConfig,
}

/// A starting request
#[derive(Debug, Clone, Deserialize)]
pub struct StartEntry {
    pub url: String,

    #[serde(default = "default_start_label")]
    pub label: Label,
}

fn default_start_label() -> Label {
    Label::Start
}

/// The two supported page-count arithmetics
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum PaginationConfig {
    /// API paging: every response reports `total` and `count`
    CountedTotal {
        /// Items requested per page
        #[serde(rename = "page-size")]
        page_size: u32,

        /// Query parameter carrying the zero-based page number
        #[serde(rename = "page-param", default = "default_page_param")]
        page_param: String,
    },

    /// HTML paging: page count derived from a listing-wide item counter
    DerivedPageCount {
        /// Page URL with `{category}` and `{page}` placeholders
        #[serde(rename = "page-url-template")]
        page_url_template: String,
    },
}

fn default_page_param() -> String {
    "page".to_string()
}
