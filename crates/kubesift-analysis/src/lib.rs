//! Log analysis for kubesift
//!
//! This crate classifies collected log entries, renders the analysis report
//! and asks an external text-generation service for insights on it.

mod classifier;
mod insight;
mod report;

pub use classifier::{Category, Classifier, LogAnalysis, PatternSet, RESTART_PREFIX};
pub use insight::{
    ANALYSIS_PROMPT, AzureOpenAiGenerator, InsightConfig, InsightError, InsightGenerator,
    compose_insight_input, generate_insights,
};

// Re-export types used in our public API
pub use kubesift_types::LogEntry;
