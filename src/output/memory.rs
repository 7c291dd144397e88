//! In-memory sink for embedding the crawler

use crate::crawler::Item;
use crate::output::traits::{ItemSink, OutputResult};
use std::sync::{Arc, Mutex, PoisonError};

/// Collects emitted items in a shared vector
///
/// Clones share the same storage, so a caller can keep one clone and hand the
/// other to the crawl.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    items: Arc<Mutex<Vec<Item>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out everything pushed so far
    pub fn items(&self) -> Vec<Item> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ItemSink for MemorySink {
    fn push(&mut self, items: &[Item]) -> OutputResult<()> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(items);
        Ok(())
    }

    fn flush(&mut self) -> OutputResult<()> {
        Ok(())
    }
}
