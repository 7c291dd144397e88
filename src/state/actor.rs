//! Single-writer owner of the shared crawl state
//!
//! One task owns the processed id set, the run counters, the storage handle
//! and the item sink. Workers never touch these directly: they send messages
//! through a [`StateHandle`] and the task applies them one at a time, so
//! concurrent completions cannot race or lose updates.
//!
//! The task checkpoints on a timer and performs a forced checkpoint when it
//! stops, whether it was asked to shut down or every handle was dropped.

use crate::crawler::Item;
use crate::output::ItemSink;
use crate::state::counters::{Counters, DUPLICATES, PRODUCTS};
use crate::state::processed_ids::ProcessedIdSet;
use crate::storage::{RunStatus, Storage};
use crate::CrawlError;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Result of admitting one extraction batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdmitOutcome {
    /// Items pushed to the sink
    pub saved: u64,

    /// Items dropped as already emitted
    pub duplicates: u64,
}

/// Point-in-time view of the shared state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub run_id: i64,
    pub counters: BTreeMap<String, u64>,
    pub processed_ids: usize,
    pub failed_requests: u64,
}

impl StateSnapshot {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

enum StateMessage {
    Admit {
        items: Vec<Item>,
        reply: oneshot::Sender<Result<AdmitOutcome, CrawlError>>,
    },
    Add {
        name: String,
        by: u64,
    },
    RecordFailure {
        url: String,
        label: String,
        error: String,
        attempts: u32,
    },
    Save {
        force: bool,
        reply: oneshot::Sender<Result<bool, CrawlError>>,
    },
    Snapshot {
        reply: oneshot::Sender<StateSnapshot>,
    },
    Shutdown {
        status: RunStatus,
    },
}

/// Cloneable handle for messaging the state task
#[derive(Clone)]
pub struct StateHandle {
    tx: mpsc::Sender<StateMessage>,
}

impl StateHandle {
    async fn send(&self, message: StateMessage) -> Result<(), CrawlError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| CrawlError::StateClosed)
    }

    /// Filters a batch through the processed id set and emits the fresh items
    ///
    /// Fresh items are pushed to the sink first; only then are their ids
    /// added to the set and the `products`/`duplicates` counters bumped.
    pub async fn admit(&self, items: Vec<Item>) -> Result<AdmitOutcome, CrawlError> {
        let (reply, rx) = oneshot::channel();
        self.send(StateMessage::Admit { items, reply }).await?;
        rx.await.map_err(|_| CrawlError::StateClosed)?
    }

    /// Increments a counter by one
    pub async fn inc(&self, name: &str) -> Result<(), CrawlError> {
        self.add(name, 1).await
    }

    /// Increments a counter by `n`
    pub async fn add(&self, name: &str, n: u64) -> Result<(), CrawlError> {
        self.send(StateMessage::Add {
            name: name.to_string(),
            by: n,
        })
        .await
    }

    /// Records an abandoned request in the run's failure table
    pub async fn record_failure(
        &self,
        url: &str,
        label: &str,
        error: &str,
        attempts: u32,
    ) -> Result<(), CrawlError> {
        self.send(StateMessage::RecordFailure {
            url: url.to_string(),
            label: label.to_string(),
            error: error.to_string(),
            attempts,
        })
        .await
    }

    /// Checkpoints now
    ///
    /// With `force == false` nothing is written unless state changed since the
    /// last checkpoint.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - A checkpoint was written
    /// * `Ok(false)` - Nothing had changed
    /// * `Err(CrawlError)` - The sink flush or the storage write failed
    pub async fn save(&self, force: bool) -> Result<bool, CrawlError> {
        let (reply, rx) = oneshot::channel();
        self.send(StateMessage::Save { force, reply }).await?;
        rx.await.map_err(|_| CrawlError::StateClosed)?
    }

    pub async fn snapshot(&self) -> Result<StateSnapshot, CrawlError> {
        let (reply, rx) = oneshot::channel();
        self.send(StateMessage::Snapshot { reply }).await?;
        rx.await.map_err(|_| CrawlError::StateClosed)
    }

    /// Asks the task to stop and mark the run with `status`
    ///
    /// The final checkpoint result is reported by the task's join handle.
    pub async fn shutdown(&self, status: RunStatus) -> Result<(), CrawlError> {
        self.send(StateMessage::Shutdown { status }).await
    }
}

/// Everything the state task takes ownership of
pub struct StateParts {
    pub run_id: i64,
    pub processed: ProcessedIdSet,
    pub counters: Counters,
    pub storage: Box<dyn Storage + Send>,
    pub sink: Box<dyn ItemSink + Send>,
}

/// Join handle yielding the state after the final checkpoint
pub type StateTask = JoinHandle<Result<StateSnapshot, CrawlError>>;

/// Starts the state task
///
/// # Arguments
///
/// * `parts` - State, storage and sink the task will own
/// * `checkpoint_interval` - Period of the non-forced checkpoint
///
/// # Returns
///
/// A handle for messaging the task and its join handle. The join handle
/// resolves once the final forced checkpoint has run; an error there means
/// state from this run may not be durable.
pub fn spawn_state(parts: StateParts, checkpoint_interval: Duration) -> (StateHandle, StateTask) {
    let (tx, rx) = mpsc::channel(1024);
    let actor = StateActor {
        run_id: parts.run_id,
        processed: parts.processed,
        counters: parts.counters,
        storage: parts.storage,
        sink: parts.sink,
        failed_requests: 0,
    };

    let task = tokio::spawn(actor.run(rx, checkpoint_interval));
    (StateHandle { tx }, task)
}

struct StateActor {
    run_id: i64,
    processed: ProcessedIdSet,
    counters: Counters,
    storage: Box<dyn Storage + Send>,
    sink: Box<dyn ItemSink + Send>,
    failed_requests: u64,
}

impl StateActor {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<StateMessage>,
        checkpoint_interval: Duration,
    ) -> Result<StateSnapshot, CrawlError> {
        let mut ticker = tokio::time::interval(checkpoint_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        let final_status = loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(StateMessage::Shutdown { status }) => break Some(status),
                    Some(message) => self.handle(message),
                    None => break None,
                },
                _ = ticker.tick() => {
                    match self.checkpoint(false) {
                        Ok(true) => tracing::debug!("Checkpoint saved"),
                        Ok(false) => {}
                        Err(e) => tracing::warn!("Periodic checkpoint failed, will retry: {}", e),
                    }
                }
            }
        };

        self.finish(final_status)
    }

    fn handle(&mut self, message: StateMessage) {
        match message {
            StateMessage::Admit { items, reply } => {
                let _ = reply.send(self.admit(items));
            }
            StateMessage::Add { name, by } => self.counters.add(&name, by),
            StateMessage::RecordFailure {
                url,
                label,
                error,
                attempts,
            } => {
                self.failed_requests += 1;
                if let Err(e) =
                    self.storage
                        .record_failed_request(self.run_id, &url, &label, &error, attempts)
                {
                    tracing::warn!("Could not record failed request {}: {}", url, e);
                }
            }
            StateMessage::Save { force, reply } => {
                let _ = reply.send(self.checkpoint(force));
            }
            StateMessage::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            StateMessage::Shutdown { .. } => {}
        }
    }

    fn admit(&mut self, items: Vec<Item>) -> Result<AdmitOutcome, CrawlError> {
        let admission = self.processed.partition(items);

        if !admission.fresh.is_empty() {
            self.sink.push(&admission.fresh)?;
        }

        for item in &admission.fresh {
            self.processed.add(item.item_id.as_str());
        }

        let saved = admission.fresh.len() as u64;
        self.counters.add(PRODUCTS, saved);
        self.counters.add(DUPLICATES, admission.duplicates);

        Ok(AdmitOutcome {
            saved,
            duplicates: admission.duplicates,
        })
    }

    fn checkpoint(&mut self, force: bool) -> Result<bool, CrawlError> {
        if !force && !self.processed.is_dirty() && !self.counters.is_dirty() {
            return Ok(false);
        }

        // Ids may only become durable once their items are
        self.sink.flush()?;
        self.storage.save_checkpoint(
            self.run_id,
            self.counters.as_map(),
            &self.processed.to_sorted_vec(),
        )?;

        self.processed.mark_clean();
        self.counters.mark_clean();
        Ok(true)
    }

    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            run_id: self.run_id,
            counters: self.counters.as_map().clone(),
            processed_ids: self.processed.len(),
            failed_requests: self.failed_requests,
        }
    }

    fn finish(mut self, status: Option<RunStatus>) -> Result<StateSnapshot, CrawlError> {
        if let Err(e) = self.checkpoint(true) {
            tracing::error!("Final checkpoint failed: {}", e);
            if let Err(e) = self.storage.finish_run(self.run_id, RunStatus::Failed) {
                tracing::error!("Could not mark run {} as failed: {}", self.run_id, e);
            }
            return Err(CrawlError::Checkpoint(e.to_string()));
        }

        // Without an explicit shutdown the run stays resumable
        if let Some(status) = status {
            self.storage.finish_run(self.run_id, status)?;
        }

        tracing::info!(
            "State flushed: {} processed ids, counters {:?}",
            self.processed.len(),
            self.counters.as_map()
        );
        Ok(self.snapshot())
    }
}
