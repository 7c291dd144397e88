//! Crawler module for fetching and processing catalog pages
//!
//! This module contains the core crawling logic, including:
//! - Requests, labels and the frontier queue
//! - HTTP fetching with retry logic
//! - Label-based dispatch to site extractors
//! - Pagination planning
//! - Rate limiting and overall crawl orchestration

mod extract;
mod fetcher;
mod frontier;
mod item;
mod orchestrator;
mod pagination;
mod request;
mod router;
mod scheduler;

pub use extract::{BodyFormat, Document, ExtractError, Extraction, PageCounts};
pub use fetcher::{
    build_http_client, fetch_page, fetch_with_retry, FetchError, FetchFailure, FetchedPage,
    RetryPolicy,
};
pub use frontier::Frontier;
pub use item::{clean_price, Item};
pub use orchestrator::{FailureHandler, Orchestrator, RunReport};
pub use pagination::{PaginationPolicy, MAX_DERIVED_PAGES};
pub use request::{Label, Request, RequestKey, UserData};
pub use router::{Handler, Router, RouterBuilder};
pub use scheduler::{FetchSlot, Scheduler};

use crate::config::Config;
use crate::output::JsonLinesSink;
use crate::sites::router_for;
use crate::CrawlError;
use std::path::Path;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Build the router for the configured site
/// 2. Open the JSON Lines dataset
/// 3. Resume the interrupted run or start a new one
/// 4. Crawl until the frontier is empty
/// 5. Flush counters and processed ids
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file
/// * `fresh` - Start a new run and forget previously emitted ids
///
/// # Returns
///
/// * `Ok(RunReport)` - Crawl completed
/// * `Err(CrawlError)` - Crawl failed
pub async fn crawl(config: Config, config_hash: &str, fresh: bool) -> Result<RunReport, CrawlError> {
    let router = router_for(&config.site)?;
    let sink = JsonLinesSink::open(Path::new(&config.output.dataset_path))?;

    Orchestrator::new(config, router, Box::new(sink))
        .fresh(fresh)
        .with_config_hash(config_hash)
        .run()
        .await
}
