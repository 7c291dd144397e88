//! Output module for emitted items and run reports
//!
//! This module handles:
//! - The item sink contract the crawl state task pushes products into
//! - A JSON Lines dataset sink and an in-memory sink
//! - Loading and printing run statistics

mod jsonl;
mod memory;
pub mod stats;
mod traits;

pub use jsonl::JsonLinesSink;
pub use memory::MemorySink;
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use traits::{ItemSink, OutputError, OutputResult};
