//! Named run counters

use std::collections::BTreeMap;

/// Category listings processed (first page of each chain)
pub const CATEGORIES: &str = "categories";

/// Products emitted
pub const PRODUCTS: &str = "products";

/// Products suppressed because they were emitted before
pub const DUPLICATES: &str = "duplicates";

/// Monotonic named counters for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counters {
    values: BTreeMap<String, u64>,
    dirty: bool,
}

impl Default for Counters {
    fn default() -> Self {
        Self::from_map(BTreeMap::new())
    }
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores counters from a persisted snapshot
    ///
    /// The standard counters are always present, starting at zero.
    pub fn from_map(mut values: BTreeMap<String, u64>) -> Self {
        for name in [CATEGORIES, PRODUCTS, DUPLICATES] {
            values.entry(name.to_string()).or_insert(0);
        }
        Self {
            values,
            dirty: false,
        }
    }

    pub fn inc(&mut self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&mut self, name: &str, n: u64) {
        if n == 0 {
            return;
        }
        *self.values.entry(name.to_string()).or_insert(0) += n;
        self.dirty = true;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.values.get(name).copied().unwrap_or(0)
    }

    pub fn as_map(&self) -> &BTreeMap<String, u64> {
        &self.values
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
