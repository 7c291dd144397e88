//! State module for the shared crawl aggregates
//!
//! # Components
//!
//! - `ProcessedIdSet`: Persisted set of item ids already emitted, used to deduplicate
//! - `Counters`: Named run counters (`categories`, `products`, `duplicates`)
//! - `StateHandle`: Message handle to the task that owns both, the storage and the sink

mod actor;
pub mod counters;
mod processed_ids;

// Re-export main types
pub use actor::{spawn_state, AdmitOutcome, StateHandle, StateParts, StateSnapshot, StateTask};
pub use counters::Counters;
pub use processed_ids::{Admission, ProcessedIdSet};
