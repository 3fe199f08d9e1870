//! Shared types for kubesift
//!
//! This crate contains data structures used across multiple kubesift crates.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Retrieval Target
// ============================================================================

/// Which pods and containers a retrieval run covers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalTarget {
    pub namespace: String,
    /// Single pod to read; `None` means every pod in the namespace
    pub pod: Option<String>,
    /// Single container to read; `None` means every container of each pod
    pub container: Option<String>,
    /// Label selector used when listing pods
    pub selector: Option<String>,
}

/// Invalid combination of retrieval inputs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error(
        "no parameters specified. Please provide at least a namespace.\n\n\
         Usage examples:\n  \
         kubesift --namespace my-namespace\n  \
         kubesift --namespace my-namespace --pod my-pod\n  \
         kubesift --namespace my-namespace --pod my-pod --container my-container"
    )]
    NothingSpecified,

    #[error("pod must be specified with a namespace. For example:\n  --namespace my-namespace --pod my-pod")]
    PodWithoutNamespace,

    #[error(
        "container must be specified with both a pod and a namespace. For example:\n  \
         --namespace my-namespace --pod my-pod --container my-container"
    )]
    ContainerWithoutPod,

    #[error("a label selector cannot be combined with an explicit pod")]
    SelectorWithPod,
}

impl RetrievalTarget {
    /// Validate raw inputs; empty strings count as "not given"
    pub fn new(
        namespace: Option<String>,
        pod: Option<String>,
        container: Option<String>,
        selector: Option<String>,
    ) -> Result<Self, TargetError> {
        let namespace = non_empty(namespace);
        let pod = non_empty(pod);
        let container = non_empty(container);
        let selector = non_empty(selector);

        let Some(namespace) = namespace else {
            return Err(match (&pod, &container) {
                (None, None) => TargetError::NothingSpecified,
                (_, Some(_)) => TargetError::ContainerWithoutPod,
                (Some(_), None) => TargetError::PodWithoutNamespace,
            });
        };

        if container.is_some() && pod.is_none() {
            return Err(TargetError::ContainerWithoutPod);
        }
        if selector.is_some() && pod.is_some() {
            return Err(TargetError::SelectorWithPod);
        }

        Ok(Self {
            namespace,
            pod,
            container,
            selector,
        })
    }

    /// Target every container of every pod in a namespace
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod: None,
            container: None,
            selector: None,
        }
    }

    pub fn with_pod(mut self, pod: impl Into<String>) -> Self {
        self.pod = Some(pod.into());
        self
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Fetch Options
// ============================================================================

/// Time range for log retrieval
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum TimeRange {
    /// Everything the container still has
    #[default]
    All,
    /// Last 5 minutes
    Last5m,
    /// Last 15 minutes
    Last15m,
    /// Last 30 minutes
    Last30m,
    /// Last 1 hour
    Last1h,
    /// Last 6 hours
    Last6h,
    /// Last 24 hours
    Last24h,
}

impl TimeRange {
    const ALL: [TimeRange; 7] = [
        Self::All,
        Self::Last5m,
        Self::Last15m,
        Self::Last30m,
        Self::Last1h,
        Self::Last6h,
        Self::Last24h,
    ];

    /// Get the number of seconds for this time range
    pub fn as_seconds(&self) -> Option<i64> {
        match self {
            Self::All => None,
            Self::Last5m => Some(5 * 60),
            Self::Last15m => Some(15 * 60),
            Self::Last30m => Some(30 * 60),
            Self::Last1h => Some(60 * 60),
            Self::Last6h => Some(6 * 60 * 60),
            Self::Last24h => Some(24 * 60 * 60),
        }
    }

    /// Get display label for this time range
    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Last5m => "5m",
            Self::Last15m => "15m",
            Self::Last30m => "30m",
            Self::Last1h => "1h",
            Self::Last6h => "6h",
            Self::Last24h => "24h",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Unrecognised time range label
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown time range '{0}', expected one of: all, 5m, 15m, 30m, 1h, 6h, 24h")]
pub struct ParseTimeRangeError(String);

impl FromStr for TimeRange {
    type Err = ParseTimeRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|range| range.label() == wanted)
            .ok_or_else(|| ParseTimeRangeError(s.to_string()))
    }
}

impl TryFrom<String> for TimeRange {
    type Error = ParseTimeRangeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Per-container log request parameters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Only the last N lines
    pub tail_lines: Option<i64>,
    /// Only lines newer than this many seconds
    pub since_seconds: Option<i64>,
}

impl FetchOptions {
    pub fn new(tail_lines: Option<i64>, range: TimeRange) -> Self {
        let since_seconds = range.as_seconds();
        Self {
            // A time window wins over a line count
            tail_lines: if since_seconds.is_some() {
                None
            } else {
                tail_lines
            },
            since_seconds,
        }
    }
}

// ============================================================================
// Log Types
// ============================================================================

/// A single line of container output with its origin
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub namespace: String,

    /// Source pod name
    pub pod_name: String,

    /// Source container name
    pub container: String,

    /// One log line, without the trailing newline
    pub content: String,

    /// Ingestion time (container logs carry no per-line timestamp)
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// Create an entry stamped with the current time
    pub fn new(
        namespace: impl Into<String>,
        pod_name: impl Into<String>,
        container: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            container: container.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Copy of this entry with `prefix` put in front of the content
    pub fn with_content_prefix(&self, prefix: &str) -> Self {
        Self {
            content: format!("{prefix}{}", self.content),
            ..self.clone()
        }
    }

    /// Timestamp formatted as RFC 3339 with second precision
    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }
}
