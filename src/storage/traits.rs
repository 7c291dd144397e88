//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{FailedRequestRecord, RunRecord, RunStatus};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The crawl state task owns the only handle during a run, so
/// implementations need to be `Send` but not `Sync`.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as finished with the given status and a finish timestamp
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Checkpoint State =====

    /// Loads every item id emitted by any run
    fn load_processed_ids(&self) -> StorageResult<Vec<String>>;

    /// Forgets all emitted item ids
    fn clear_processed_ids(&mut self) -> StorageResult<()>;

    /// Loads the counters saved for a run
    fn load_stats(&self, run_id: i64) -> StorageResult<BTreeMap<String, u64>>;

    /// Writes a run's counters and the full processed id set
    ///
    /// Both are written in a single transaction: after a crash the stored
    /// counters and ids always come from the same checkpoint.
    fn save_checkpoint(
        &mut self,
        run_id: i64,
        stats: &BTreeMap<String, u64>,
        processed_ids: &[String],
    ) -> StorageResult<()>;

    // ===== Failed Requests =====

    /// Records a request abandoned during a run
    fn record_failed_request(
        &mut self,
        run_id: i64,
        url: &str,
        label: &str,
        error: &str,
        attempts: u32,
    ) -> StorageResult<()>;

    /// Gets the requests abandoned during a run
    fn get_failed_requests(&self, run_id: i64) -> StorageResult<Vec<FailedRequestRecord>>;
}
