//! Persisted set of product identifiers already emitted
//!
//! The set only grows. It is loaded from storage when a run starts and
//! written back at every checkpoint, so a product emitted by any earlier run
//! is suppressed in all later ones.

use crate::crawler::Item;
use std::collections::HashSet;

/// Outcome of filtering one extraction batch
#[derive(Debug, Default)]
pub struct Admission {
    /// Items whose ids were not in the set, in batch order
    pub fresh: Vec<Item>,

    /// Items dropped because their id was already present
    pub duplicates: u64,
}

/// Append-only set of item identifiers
#[derive(Debug, Clone, Default)]
pub struct ProcessedIdSet {
    ids: HashSet<String>,
    dirty: bool,
}

impl ProcessedIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from persisted ids. The result is clean.
    pub fn from_ids(ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            dirty: false,
        }
    }

    pub fn has(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Adds an id, returning true if it was not present
    pub fn add(&mut self, id: impl Into<String>) -> bool {
        let inserted = self.ids.insert(id.into());
        self.dirty |= inserted;
        inserted
    }

    /// Splits a batch into fresh items and a duplicate count
    ///
    /// The set is not modified: callers add the fresh ids only once the items
    /// have been handed to the sink. A repeated id inside the batch counts as
    /// a duplicate after its first occurrence.
    pub fn partition(&self, items: Vec<Item>) -> Admission {
        let mut batch_ids = HashSet::new();
        let mut admission = Admission::default();

        for item in items {
            if self.has(&item.item_id) || !batch_ids.insert(item.item_id.clone()) {
                admission.duplicates += 1;
            } else {
                admission.fresh.push(item);
            }
        }

        admission
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns true if ids were added since the last [`mark_clean`](Self::mark_clean)
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// All ids in sorted order, as persisted
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.ids.iter().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> Item {
        Item::new(id, format!("Product {}", id), format!("https://e.com/{}", id))
    }

    #[test]
    fn test_add_and_has() {
        let mut set = ProcessedIdSet::new();
        assert!(!set.has("A"));
        assert!(set.add("A"));
        assert!(!set.add("A"));
        assert!(set.has("A"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_loaded_set_is_clean() {
        let mut set = ProcessedIdSet::from_ids(vec!["A".to_string(), "B".to_string()]);
        assert!(!set.is_dirty());

        set.add("A");
        assert!(!set.is_dirty());

        set.add("C");
        assert!(set.is_dirty());

        set.mark_clean();
        assert!(!set.is_dirty());
    }

    #[test]
    fn test_partition_against_persisted_ids() {
        let set = ProcessedIdSet::from_ids(vec!["A".to_string(), "B".to_string()]);
        let admission = set.partition(vec![item("A"), item("B"), item("C")]);

        assert_eq!(admission.duplicates, 2);
        assert_eq!(admission.fresh.len(), 1);
        assert_eq!(admission.fresh[0].item_id, "C");
        assert!(!set.has("C"));
    }

    #[test]
    fn test_partition_repeats_within_batch() {
        let set = ProcessedIdSet::new();
        let admission = set.partition(vec![item("X"), item("Y"), item("X")]);

        assert_eq!(admission.duplicates, 1);
        assert_eq!(admission.fresh.len(), 2);
        assert_eq!(admission.fresh.len() as u64 + admission.duplicates, 3);
    }

    #[test]
    fn test_sorted_vec() {
        let set = ProcessedIdSet::from_ids(vec!["b".to_string(), "a".to_string()]);
        assert_eq!(set.to_sorted_vec(), vec!["a", "b"]);
    }
}
