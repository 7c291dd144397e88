//! Run statistics from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! the summary of a crawl run from the storage layer.

use crate::state::counters::{CATEGORIES, DUPLICATES, PRODUCTS};
use crate::storage::{FailedRequestRecord, RunRecord, Storage, StorageResult};
use std::collections::BTreeMap;

/// Summary of one crawl run
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// The run the statistics describe
    pub run: RunRecord,

    /// Counters saved at the run's last checkpoint
    pub counters: BTreeMap<String, u64>,

    /// Size of the processed id set across all runs
    pub processed_ids: u64,

    /// Requests abandoned during the run
    pub failed_requests: Vec<FailedRequestRecord>,
}

impl CrawlStatistics {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Run duration in seconds, if the run has finished
    pub fn duration_seconds(&self) -> Option<i64> {
        let started = self
            .run
            .started_at
            .parse::<chrono::DateTime<chrono::Utc>>()
            .ok()?;
        let finished = self
            .run
            .finished_at
            .as_deref()?
            .parse::<chrono::DateTime<chrono::Utc>>()
            .ok()?;
        Some((finished - started).num_seconds())
    }
}

/// Loads statistics for the most recent run
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(Some(CrawlStatistics))` - Statistics of the latest run
/// * `Ok(None)` - The database holds no runs
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<Option<CrawlStatistics>> {
    let Some(run) = storage.get_latest_run()? else {
        return Ok(None);
    };

    load_run_statistics(storage, run).map(Some)
}

/// Loads statistics for a specific run
pub fn load_run_statistics(storage: &dyn Storage, run: RunRecord) -> StorageResult<CrawlStatistics> {
    let counters = storage.load_stats(run.id)?;
    let processed_ids = storage.load_processed_ids()?.len() as u64;
    let failed_requests = storage.get_failed_requests(run.id)?;

    Ok(CrawlStatistics {
        run,
        counters,
        processed_ids,
        failed_requests,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Run #{}:", stats.run.id);
    println!("  Status: {}", stats.run.status.to_db_string());
    println!("  Started: {}", stats.run.started_at);
    if let Some(finished) = &stats.run.finished_at {
        println!("  Finished: {}", finished);
    }
    if let Some(secs) = stats.duration_seconds() {
        println!("  Duration: {}s", secs);
    }
    println!();

    println!("Counters:");
    println!("  Categories: {}", stats.counter(CATEGORIES));
    println!("  Products saved: {}", stats.counter(PRODUCTS));
    println!("  Duplicates skipped: {}", stats.counter(DUPLICATES));
    for (name, value) in &stats.counters {
        if ![CATEGORIES, PRODUCTS, DUPLICATES].contains(&name.as_str()) {
            println!("  {}: {}", name, value);
        }
    }
    println!();

    println!("Processed ids (all runs): {}", stats.processed_ids);

    if !stats.failed_requests.is_empty() {
        println!();
        println!("Failed Requests ({}):", stats.failed_requests.len());
        for failed in &stats.failed_requests {
            println!(
                "  - [{}] {} after {} attempt(s): {}",
                failed.label, failed.url, failed.attempts, failed.error
            );
        }
    }
}
