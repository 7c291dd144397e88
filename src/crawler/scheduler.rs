//! Scheduler gating outgoing fetches
//!
//! This module handles:
//! - Global concurrency limiting via a semaphore
//! - The requests-per-minute ceiling, enforced by spacing attempt start times
//!
//! Every fetch attempt, including retries, takes one slot.

use crate::config::CrawlerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Permission to perform one fetch attempt
///
/// Holding it occupies one concurrency permit; dropping it frees the permit.
pub struct FetchSlot {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Scheduler spaces fetch attempts and bounds how many run at once
pub struct Scheduler {
    /// Global semaphore for limiting concurrent fetches
    semaphore: Arc<Semaphore>,

    /// Minimum spacing between attempt start times
    interval: Duration,

    /// Earliest instant the next attempt may start
    next_start: Mutex<Instant>,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `max_concurrent` - Maximum fetch attempts in flight
    /// * `max_per_minute` - Ceiling on attempts started per minute
    pub fn new(max_concurrent: usize, max_per_minute: u32) -> Self {
        let interval = Duration::from_secs(60) / max_per_minute.max(1);

        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            interval,
            next_start: Mutex::new(Instant::now()),
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.max_concurrent_requests as usize,
            config.max_requests_per_minute,
        )
    }

    /// Waits until a fetch attempt may start
    ///
    /// This method:
    /// 1. Acquires a global concurrency permit
    /// 2. Reserves the next free start time under the per-minute ceiling
    /// 3. Sleeps until that start time
    pub async fn acquire(&self) -> FetchSlot {
        // The semaphore is never closed, so acquisition only fails on shutdown
        let permit = self.semaphore.clone().acquire_owned().await.ok();

        let start_at = {
            let mut next_start = self.next_start.lock().await;
            let now = Instant::now();
            let slot = (*next_start).max(now);
            *next_start = slot + self.interval;
            slot
        };

        let wait = start_at.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tracing::trace!("Rate limit: waiting {:?} before next fetch", wait);
            tokio::time::sleep_until(start_at).await;
        }

        FetchSlot { _permit: permit }
    }

    /// Minimum spacing between attempt start times
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of fetch permits currently free
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}
