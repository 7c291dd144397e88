//! Crawl orchestrator - main crawl loop
//!
//! This module drives a crawl run end to end:
//! - Opening storage and choosing between resuming and starting a run
//! - Handing the shared aggregates to the state task
//! - Seeding the frontier with the configured start requests
//! - Running fetch, dispatch, extraction and admission in a bounded pool
//! - Feeding follow-up and pagination requests back into the frontier
//! - Reporting abandoned requests and flushing state on every exit path

use crate::config::Config;
use crate::crawler::extract::Extraction;
use crate::crawler::fetcher::{build_http_client, fetch_with_retry, FetchFailure, RetryPolicy};
use crate::crawler::frontier::Frontier;
use crate::crawler::pagination::PaginationPolicy;
use crate::crawler::request::{Label, Request};
use crate::crawler::router::Router;
use crate::crawler::scheduler::Scheduler;
use crate::output::ItemSink;
use crate::state::counters::CATEGORIES;
use crate::state::{spawn_state, Counters, ProcessedIdSet, StateHandle, StateParts};
use crate::storage::{open_storage, RunStatus, SqliteStorage, Storage};
use crate::{ConfigError, CrawlError};
use reqwest::Client;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Called for every request abandoned after its last attempt
pub type FailureHandler = Box<dyn FnMut(&Request, &FetchFailure) + Send>;

/// Outcome of a finished crawl run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: i64,

    /// Whether an interrupted run was continued
    pub resumed: bool,

    /// Counters after the final checkpoint
    pub counters: BTreeMap<String, u64>,

    /// Size of the processed id set after the run
    pub processed_ids: usize,

    /// Requests fetched and dispatched successfully
    pub requests_processed: u64,

    /// Requests abandoned after exhausting their attempts
    pub requests_failed: u64,

    /// Requests whose page could not be extracted
    pub extraction_failures: u64,

    pub duration: Duration,
}

impl RunReport {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

/// What a worker hands back to the crawl loop
enum Completion {
    Processed { follow_ups: Vec<Request> },
    Abandoned { request: Request, failure: FetchFailure },
    ExtractFailed,
    Unrouted { request: Request },
    Fatal(CrawlError),
}

/// Shared by every in-flight worker
struct WorkerContext {
    client: Client,
    scheduler: Scheduler,
    retry: RetryPolicy,
    router: Router,
    pagination: PaginationPolicy,
    state: StateHandle,
}

/// Main crawl orchestrator
pub struct Orchestrator {
    config: Config,
    config_hash: String,
    router: Router,
    sink: Box<dyn ItemSink + Send>,
    fresh: bool,
    failure_handler: FailureHandler,
}

impl Orchestrator {
    /// Creates an orchestrator for one run
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `router` - The site's label-to-handler table
    /// * `sink` - Where emitted items go
    pub fn new(config: Config, router: Router, sink: Box<dyn ItemSink + Send>) -> Self {
        Self {
            config,
            config_hash: String::new(),
            router,
            sink,
            fresh: false,
            failure_handler: Box::new(log_abandoned),
        }
    }

    /// Starts a new run and forgets every previously emitted id
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// Hash of the configuration file, stored with the run
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    /// Replaces the default handler for abandoned requests
    ///
    /// Abandoned requests are recorded in the run's failure table either way;
    /// the default handler only logs them.
    pub fn with_failure_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&Request, &FetchFailure) + Send + 'static,
    {
        self.failure_handler = Box::new(handler);
        self
    }

    /// Runs the crawl until the frontier is empty
    ///
    /// # Returns
    ///
    /// * `Ok(RunReport)` - Every request was processed or abandoned and state was flushed
    /// * `Err(CrawlError)` - A fatal error stopped the crawl, or the final
    ///   checkpoint failed. State is flushed before a fatal error is returned.
    pub async fn run(self) -> Result<RunReport, CrawlError> {
        let Orchestrator {
            config,
            config_hash,
            router,
            sink,
            fresh,
            mut failure_handler,
        } = self;

        let pagination = PaginationPolicy::from(&config.site.pagination);
        check_routes(&config, &router, &pagination)?;

        let started = Instant::now();
        let mut storage = open_storage(Path::new(&config.output.database_path))?;
        let (run_id, resumed) = select_run(&mut storage, &config_hash, fresh)?;

        let counters = if resumed {
            Counters::from_map(storage.load_stats(run_id)?)
        } else {
            Counters::new()
        };
        let processed = ProcessedIdSet::from_ids(storage.load_processed_ids()?);
        tracing::info!(
            "Run {}: {} processed ids loaded, counters {:?}",
            run_id,
            processed.len(),
            counters.as_map()
        );

        let client = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.crawler.request_timeout_secs),
        )?;

        let (state, state_task) = spawn_state(
            StateParts {
                run_id,
                processed,
                counters,
                storage: Box::new(storage),
                sink,
            },
            Duration::from_secs(config.crawler.checkpoint_interval_secs),
        );

        let context = Arc::new(WorkerContext {
            client,
            scheduler: Scheduler::from_config(&config.crawler),
            retry: RetryPolicy::from_config(&config.crawler),
            router,
            pagination,
            state: state.clone(),
        });

        let mut frontier = Frontier::new();
        for entry in &config.site.start {
            frontier.add(Request::new(entry.url.as_str(), entry.label));
        }
        tracing::info!(
            "Crawling {} from {} start request(s)",
            context.router.site(),
            frontier.len()
        );

        let max_in_flight = config.crawler.max_concurrent_requests.max(1) as usize;
        let mut tally = Tally::default();
        let mut in_flight = JoinSet::new();

        let outcome: Result<(), CrawlError> = loop {
            while in_flight.len() < max_in_flight {
                let Some(request) = frontier.next() else {
                    break;
                };
                in_flight.spawn(process_request(Arc::clone(&context), request));
            }

            let completion = match in_flight.join_next().await {
                None => {
                    tracing::info!("Frontier is empty, crawl complete");
                    break Ok(());
                }
                Some(Ok(completion)) => completion,
                Some(Err(e)) => {
                    tracing::error!("Request task failed: {}", e);
                    continue;
                }
            };

            match completion {
                Completion::Processed { follow_ups } => {
                    tally.processed += 1;
                    frontier.extend(follow_ups);
                }
                Completion::Abandoned { request, failure } => {
                    tally.failed += 1;
                    failure_handler(&request, &failure);
                    if let Err(e) = state
                        .record_failure(
                            request.url(),
                            request.label().as_str(),
                            &failure.error.to_string(),
                            failure.attempts,
                        )
                        .await
                    {
                        break Err(e);
                    }
                }
                Completion::ExtractFailed => tally.extraction_failures += 1,
                Completion::Unrouted { request } => {
                    break Err(CrawlError::UnroutedLabel {
                        label: request.label(),
                        url: request.url().to_string(),
                    });
                }
                Completion::Fatal(e) => break Err(e),
            }

            let done = tally.processed + tally.failed + tally.extraction_failures;
            if done % 50 == 0 {
                tracing::info!(
                    "Progress: {} requests done, {} pending, {} in flight",
                    done,
                    frontier.len(),
                    in_flight.len()
                );
            }
        };

        if outcome.is_err() {
            in_flight.shutdown().await;
        }

        let status = if outcome.is_ok() {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        if let Err(e) = state.shutdown(status).await {
            tracing::warn!("State task stopped before shutdown: {}", e);
        }
        drop(state);
        drop(context);

        let flushed = match state_task.await {
            Ok(result) => result,
            Err(e) => Err(CrawlError::Checkpoint(format!("state task failed: {}", e))),
        };

        // A fatal crawl error takes precedence; a flush failure is fatal on its own
        let snapshot = match (outcome, flushed) {
            (Err(e), Ok(_)) => return Err(e),
            (Err(e), Err(flush)) => {
                tracing::error!("Final checkpoint failed: {}", flush);
                return Err(e);
            }
            (Ok(()), Err(flush)) => return Err(flush),
            (Ok(()), Ok(snapshot)) => snapshot,
        };

        let report = RunReport {
            run_id,
            resumed,
            counters: snapshot.counters,
            processed_ids: snapshot.processed_ids,
            requests_processed: tally.processed,
            requests_failed: tally.failed,
            extraction_failures: tally.extraction_failures,
            duration: started.elapsed(),
        };

        tracing::info!(
            "Crawl completed: {} requests processed, {} failed in {:?}",
            report.requests_processed,
            report.requests_failed,
            report.duration
        );

        Ok(report)
    }
}

#[derive(Debug, Default)]
struct Tally {
    processed: u64,
    failed: u64,
    extraction_failures: u64,
}

fn log_abandoned(request: &Request, failure: &FetchFailure) {
    tracing::error!(
        "Request [{}] {} abandoned after {} attempt(s): {}",
        request.label(),
        request.url(),
        failure.attempts,
        failure.error
    );
}

/// Checks that every label the crawl can produce up front has a handler
fn check_routes(
    config: &Config,
    router: &Router,
    pagination: &PaginationPolicy,
) -> Result<(), ConfigError> {
    for entry in &config.site.start {
        if !router.handles(entry.label) {
            return Err(ConfigError::Routing(format!(
                "start request {} has label '{}' but site '{}' has no handler for it",
                entry.url,
                entry.label,
                router.site()
            )));
        }
    }

    let follow_up = pagination.follow_up_label(Label::Category);
    if !router.handles(follow_up) {
        return Err(ConfigError::Routing(format!(
            "pagination produces '{}' requests but site '{}' has no handler for them",
            follow_up,
            router.site()
        )));
    }

    Ok(())
}

/// Picks the run to record into
///
/// An interrupted run (still marked running) is resumed unless `fresh` is
/// set; a fresh run also forgets every previously emitted id.
fn select_run(
    storage: &mut SqliteStorage,
    config_hash: &str,
    fresh: bool,
) -> Result<(i64, bool), CrawlError> {
    if fresh {
        tracing::info!("Starting fresh run, clearing processed ids");
        if let Some(latest) = storage.get_latest_run()? {
            if latest.status == RunStatus::Running {
                storage.finish_run(latest.id, RunStatus::Failed)?;
            }
        }
        storage.clear_processed_ids()?;
        return Ok((storage.create_run(config_hash)?, false));
    }

    match storage.get_latest_run()? {
        Some(latest) if latest.status == RunStatus::Running => {
            if latest.config_hash != config_hash {
                tracing::warn!(
                    "Resuming run {} although the configuration changed since it started",
                    latest.id
                );
            }
            tracing::info!("Resuming interrupted run {}", latest.id);
            Ok((latest.id, true))
        }
        Some(_) => {
            tracing::info!("Starting new run");
            Ok((storage.create_run(config_hash)?, false))
        }
        None => {
            tracing::info!("No previous runs found, starting new run");
            Ok((storage.create_run(config_hash)?, false))
        }
    }
}

/// Fetches, dispatches and admits one request
async fn process_request(context: Arc<WorkerContext>, request: Request) -> Completion {
    tracing::debug!("Scraping [{}] - {}", request.label(), request.url());

    let page = match fetch_with_retry(
        &context.client,
        &context.scheduler,
        &request,
        context.retry,
    )
    .await
    {
        Ok(page) => page,
        Err(failure) => return Completion::Abandoned { request, failure },
    };
    if page.final_url != request.url() {
        tracing::debug!("{} - redirected to {}", request.url(), page.final_url);
    }

    let extraction = match context.router.dispatch(&page.body, &request) {
        Ok(Some(extraction)) => extraction,
        Ok(None) => return Completion::Unrouted { request },
        Err(e) => {
            tracing::warn!("Extraction failed for {}: {}", request.url(), e);
            return Completion::ExtractFailed;
        }
    };

    let Extraction {
        items,
        mut requests,
        pagination,
    } = extraction;

    if let Some(counts) = &pagination {
        requests.extend(context.pagination.plan_next_pages(counts, &request));
    }

    if request.label() == Label::Category && is_first_page(&request) {
        if let Err(e) = context.state.inc(CATEGORIES).await {
            return Completion::Fatal(e);
        }
    }

    if !items.is_empty() {
        let found = items.len();
        match context.state.admit(items).await {
            Ok(outcome) => tracing::info!(
                "{} - Found {} products, saved {}",
                request.url(),
                found,
                outcome.saved
            ),
            Err(e) => return Completion::Fatal(e),
        }
    }

    Completion::Processed {
        follow_ups: requests,
    }
}

/// Category pages are numbered from zero; later derived pages carry the Page label
fn is_first_page(request: &Request) -> bool {
    matches!(request.user_data().page, None | Some(0))
}
