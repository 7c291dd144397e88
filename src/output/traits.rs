//! Item sink trait and error types
//!
//! A sink is the append-only destination for emitted products. The crawl
//! state task is its only caller, so implementations need `Send` but never
//! see concurrent calls.

use crate::crawler::Item;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination for emitted items
pub trait ItemSink {
    /// Appends a batch of items
    ///
    /// Order within and across batches carries no meaning.
    ///
    /// # Arguments
    ///
    /// * `items` - Items that passed deduplication
    fn push(&mut self, items: &[Item]) -> OutputResult<()>;

    /// Makes every pushed item durable
    ///
    /// Called before each checkpoint: once it returns, the ids of all pushed
    /// items may be persisted as processed.
    fn flush(&mut self) -> OutputResult<()>;
}
