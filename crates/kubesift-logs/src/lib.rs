//! Log processing for kubesift
//!
//! This crate provides the log store, line splitting and the concurrent
//! collector that fans out over pods and containers.

mod collector;
mod lines;
mod store;

pub use collector::{
    CollectorConfig, FailureSink, LogCollector, RetrievalError, RetrievalEvent, RetrievalFailure,
    RetrievalSummary, TracingSink,
};
pub use lines::split_lines;
pub use store::LogStore;

// Re-export types used in our public API
pub use kubesift_types::{FetchOptions, LogEntry, RetrievalTarget, TimeRange};
