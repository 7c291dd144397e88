//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests carrying per-request headers
//! - Error classification into transient and permanent failures
//! - The retry loop for transient failures

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::crawler::request::Request;
use crate::crawler::scheduler::Scheduler;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// A successfully fetched response
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: String,
    /// Raw body
    pub body: Vec<u8>,
}

/// Why a single fetch attempt failed
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("Request timeout")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Failed to read body: {0}")]
    Body(String),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Returns true if a later attempt may succeed
    ///
    /// | Condition | Transient |
    /// |-----------|-----------|
    /// | Timeout, connection error, body read error | yes |
    /// | HTTP 408, 429, 5xx | yes |
    /// | Other HTTP status | no |
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            Self::Timeout | Self::Connect(_) | Self::Body(_) => true,
            Self::Other(_) => false,
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            Self::Body(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// A request that exhausted its attempts or failed permanently
#[derive(Debug, Clone)]
pub struct FetchFailure {
    /// Number of attempts made
    pub attempts: u32,
    /// Error from the last attempt
    pub error: FetchError,
}

/// How many times to attempt a request and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Pause before each repeated attempt
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Per-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Performs a single GET for `request`
///
/// Any non-success status is an error; whether it is worth retrying is
/// decided by [`FetchError::is_transient`].
pub async fn fetch_page(client: &Client, request: &Request) -> Result<FetchedPage, FetchError> {
    let mut builder = client.get(request.url());
    for (name, value) in request.headers() {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder.send().await.map_err(FetchError::from_reqwest)?;
    let status = response.status();
    let final_url = response.url().to_string();

    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await.map_err(FetchError::from_reqwest)?;

    Ok(FetchedPage {
        final_url,
        body: body.to_vec(),
    })
}

/// Fetches a request, retrying transient failures
///
/// Every attempt first takes a slot from the scheduler, so retries count
/// against the requests-per-minute ceiling like any other fetch. Each failed
/// attempt is logged with the request URL.
///
/// # Returns
///
/// * `Ok(FetchedPage)` - An attempt succeeded
/// * `Err(FetchFailure)` - Attempts were exhausted or the failure was permanent
pub async fn fetch_with_retry(
    client: &Client,
    scheduler: &Scheduler,
    request: &Request,
    policy: RetryPolicy,
) -> Result<FetchedPage, FetchFailure> {
    let mut attempt = 0;

    loop {
        attempt += 1;
        let slot = scheduler.acquire().await;

        let error = match fetch_page(client, request).await {
            Ok(page) => return Ok(page),
            Err(e) => e,
        };

        if !error.is_transient() {
            tracing::warn!(
                "Request {} failed permanently (attempt {}): {}",
                request.url(),
                attempt,
                error
            );
            return Err(FetchFailure {
                attempts: attempt,
                error,
            });
        }

        if attempt >= policy.max_attempts {
            tracing::warn!(
                "Request {} failed (attempt {}/{}), giving up: {}",
                request.url(),
                attempt,
                policy.max_attempts,
                error
            );
            return Err(FetchFailure {
                attempts: attempt,
                error,
            });
        }

        tracing::warn!(
            "Request {} failed (attempt {}/{}), retrying: {}",
            request.url(),
            attempt,
            policy.max_attempts,
            error
        );
        drop(slot);
        tokio::time::sleep(policy.delay).await;
    }
}
