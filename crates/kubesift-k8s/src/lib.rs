//! Kubernetes client for kubesift
//!
//! This crate provides the cluster access the log collector depends on:
//! listing pods, listing a pod's containers and reading container logs.

mod client;
mod source;

pub use client::KubeClient;
pub use source::ClusterSource;

// Re-export types that are used in our public API
pub use kubesift_types::FetchOptions;
