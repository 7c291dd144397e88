//! FIFO frontier of pending requests with per-run duplicate suppression

use crate::crawler::request::{Request, RequestKey};
use std::collections::{HashSet, VecDeque};

/// Pending-work queue
///
/// The frontier is not persisted: after a crash, category traversal restarts
/// from the configured start requests and the processed-id set absorbs the
/// repeated products.
#[derive(Debug, Default)]
pub struct Frontier {
    /// Requests waiting to be fetched, oldest first
    queue: VecDeque<Request>,

    /// Identities of every request accepted during this run
    seen: HashSet<RequestKey>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a request unless its identity was already accepted this run
    ///
    /// # Returns
    ///
    /// `true` if the request was enqueued, `false` if it was dropped as a
    /// repeat or because its URL cannot be normalized
    pub fn add(&mut self, request: Request) -> bool {
        let key = match request.key() {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("Dropping request with invalid URL {}: {}", request.url(), e);
                return false;
            }
        };

        if !self.seen.insert(key) {
            tracing::trace!("Already seen [{}] {}", request.label(), request.url());
            return false;
        }

        self.queue.push_back(request);
        true
    }

    /// Enqueues every request, returning how many were accepted
    pub fn extend(&mut self, requests: impl IntoIterator<Item = Request>) -> usize {
        requests
            .into_iter()
            .map(|request| self.add(request))
            .filter(|added| *added)
            .count()
    }

    /// Removes and returns the oldest pending request
    pub fn next(&mut self) -> Option<Request> {
        self.queue.pop_front()
    }

    /// Returns the number of pending requests
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns whether no requests are pending
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of distinct requests accepted this run
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}
