use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use kubesift_k8s::ClusterSource;
use kubesift_types::{FetchOptions, LogEntry, RetrievalTarget, TimeRange};

use crate::{LogStore, split_lines};

/// Tuning for a collection run
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Upper bound on cluster calls in flight at once
    pub max_concurrency: usize,

    /// Buffer size of the fan-in channel
    pub channel_capacity: usize,

    /// Only fetch the last N lines of each container
    pub tail_lines: Option<i64>,

    /// Only fetch lines newer than this
    pub since: TimeRange,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            channel_capacity: 100,
            tail_lines: None,
            since: TimeRange::All,
        }
    }
}

/// Message sent from a pod or container task to the fan-in consumer
#[derive(Debug)]
pub enum RetrievalEvent {
    Entry(LogEntry),
    Failure(RetrievalFailure),
}

/// A pod or container whose logs could not be read
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalFailure {
    pub pod: String,
    /// `None` when listing the pod's containers failed
    pub container: Option<String>,
    pub message: String,
}

impl fmt::Display for RetrievalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.container {
            Some(container) => write!(
                f,
                "failed to retrieve logs for pod {}, container {}: {}",
                self.pod, container, self.message
            ),
            None => write!(
                f,
                "failed to list containers for pod {}: {}",
                self.pod, self.message
            ),
        }
    }
}

/// Receives non-fatal failures while a run is in progress
pub trait FailureSink: Send + Sync {
    fn report(&self, failure: &RetrievalFailure);
}

/// Sink that only logs failures
pub struct TracingSink;

impl FailureSink for TracingSink {
    fn report(&self, failure: &RetrievalFailure) {
        warn!(pod = %failure.pod, container = ?failure.container, "{}", failure);
    }
}

/// Fatal collection error; nothing was retrieved
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("namespace must not be empty")]
    EmptyNamespace,

    #[error("failed to list pods in namespace {namespace}")]
    ListPods {
        namespace: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Counts describing a finished run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetrievalSummary {
    pub pods: usize,
    pub containers: usize,
    pub entries: usize,
    pub failures: usize,
}

/// Shared state handed to every pod and container task
struct TaskContext {
    source: Arc<dyn ClusterSource>,
    namespace: String,
    container: Option<String>,
    fetch: FetchOptions,
    permits: Semaphore,
    tracker: TaskTracker,
    containers: AtomicUsize,
}

/// Collects container logs from many pods concurrently
///
/// One task is spawned per pod and, inside it, one per container. A
/// semaphore bounds how many of them talk to the cluster at the same time.
/// Every task reports over a single channel; the channel closes once the
/// last task has dropped its sender.
pub struct LogCollector {
    source: Arc<dyn ClusterSource>,
    config: CollectorConfig,
}

impl LogCollector {
    /// Create a new collector reading from `source`
    pub fn new(source: Arc<dyn ClusterSource>, config: CollectorConfig) -> Self {
        Self { source, config }
    }

    /// Retrieve every log line under `target` into `store`
    ///
    /// Only a failure to list the namespace's pods aborts the run. Failures
    /// for single pods or containers go to `sink` and the run continues.
    /// Returns once every spawned task has finished and the channel is drained.
    pub async fn collect(
        &self,
        target: &RetrievalTarget,
        store: &LogStore,
        sink: &dyn FailureSink,
    ) -> Result<RetrievalSummary, RetrievalError> {
        if target.namespace.trim().is_empty() {
            return Err(RetrievalError::EmptyNamespace);
        }

        let pods = match &target.pod {
            Some(pod) => vec![pod.clone()],
            None => self
                .source
                .list_pods(&target.namespace, target.selector.as_deref())
                .await
                .map_err(|source| RetrievalError::ListPods {
                    namespace: target.namespace.clone(),
                    source,
                })?,
        };

        info!(
            namespace = %target.namespace,
            pods = pods.len(),
            max_concurrency = self.config.max_concurrency,
            "collecting logs"
        );

        let ctx = Arc::new(TaskContext {
            source: Arc::clone(&self.source),
            namespace: target.namespace.clone(),
            container: target.container.clone(),
            fetch: FetchOptions::new(self.config.tail_lines, self.config.since),
            permits: Semaphore::new(
                self.config.max_concurrency.clamp(1, Semaphore::MAX_PERMITS),
            ),
            tracker: TaskTracker::new(),
            containers: AtomicUsize::new(0),
        });

        let (tx, mut rx) =
            mpsc::channel(self.config.channel_capacity.clamp(1, Semaphore::MAX_PERMITS));
        for pod in &pods {
            ctx.tracker
                .spawn(collect_pod(Arc::clone(&ctx), pod.clone(), tx.clone()));
        }
        // Pod tasks register their container tasks before they finish, so
        // the tracker cannot drain early.
        ctx.tracker.close();
        drop(tx);

        let mut summary = RetrievalSummary {
            pods: pods.len(),
            ..Default::default()
        };
        while let Some(event) = rx.recv().await {
            match event {
                RetrievalEvent::Entry(entry) => {
                    store.append(entry);
                    summary.entries += 1;
                }
                RetrievalEvent::Failure(failure) => {
                    sink.report(&failure);
                    summary.failures += 1;
                }
            }
        }
        ctx.tracker.wait().await;

        summary.containers = ctx.containers.load(Ordering::SeqCst);
        info!(
            namespace = %target.namespace,
            containers = summary.containers,
            entries = summary.entries,
            failures = summary.failures,
            "log collection finished"
        );
        Ok(summary)
    }
}

async fn collect_pod(ctx: Arc<TaskContext>, pod: String, tx: mpsc::Sender<RetrievalEvent>) {
    let containers = match &ctx.container {
        Some(container) => vec![container.clone()],
        None => {
            let Ok(_permit) = ctx.permits.acquire().await else {
                return;
            };
            debug!(pod = %pod, "listing containers");
            match ctx.source.list_containers(&ctx.namespace, &pod).await {
                Ok(containers) => containers,
                Err(e) => {
                    let failure = RetrievalFailure {
                        pod,
                        container: None,
                        message: format!("{:#}", e),
                    };
                    let _ = tx.send(RetrievalEvent::Failure(failure)).await;
                    return;
                }
            }
        }
    };

    ctx.containers.fetch_add(containers.len(), Ordering::SeqCst);
    for container in containers {
        ctx.tracker.spawn(collect_container(
            Arc::clone(&ctx),
            pod.clone(),
            container,
            tx.clone(),
        ));
    }
}

async fn collect_container(
    ctx: Arc<TaskContext>,
    pod: String,
    container: String,
    tx: mpsc::Sender<RetrievalEvent>,
) {
    let fetched = {
        let Ok(_permit) = ctx.permits.acquire().await else {
            return;
        };
        ctx.source
            .fetch_logs(&ctx.namespace, &pod, &container, &ctx.fetch)
            .await
    };

    let raw = match fetched {
        Ok(raw) => raw,
        Err(e) => {
            let failure = RetrievalFailure {
                pod,
                container: Some(container),
                message: format!("{:#}", e),
            };
            let _ = tx.send(RetrievalEvent::Failure(failure)).await;
            return;
        }
    };

    let entries = split_lines(&raw, &ctx.namespace, &pod, &container);
    debug!(pod = %pod, container = %container, lines = entries.len(), "container log collected");
    for entry in entries {
        if tx.send(RetrievalEvent::Entry(entry)).await.is_err() {
            // Consumer gone, nothing left to deliver to
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow, bail};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    /// In-memory cluster with optional failures and call latency
    #[derive(Default)]
    struct FakeCluster {
        pods: Vec<String>,
        containers: HashMap<String, Vec<String>>,
        logs: HashMap<(String, String), String>,
        fail_list_pods: bool,
        broken_pods: HashSet<String>,
        broken_containers: HashSet<(String, String)>,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        list_pods_calls: AtomicUsize,
        list_containers_calls: AtomicUsize,
        last_selector: Mutex<Option<String>>,
    }

    impl FakeCluster {
        /// `pods` pods with `containers` containers each logging `lines` lines
        fn grid(pods: usize, containers: usize, lines: usize) -> Self {
            let mut fake = Self::default();
            for p in 0..pods {
                let pod = format!("pod-{p}");
                let names: Vec<String> = (0..containers).map(|c| format!("c-{c}")).collect();
                for name in &names {
                    let log: String = (0..lines).map(|l| format!("{pod}/{name} line {l}\n")).collect();
                    fake.logs.insert((pod.clone(), name.clone()), log);
                }
                fake.containers.insert(pod.clone(), names);
                fake.pods.push(pod);
            }
            fake
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        async fn enter(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ClusterSource for FakeCluster {
        async fn list_pods(&self, _namespace: &str, selector: Option<&str>) -> Result<Vec<String>> {
            self.list_pods_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_selector.lock() = selector.map(str::to_string);
            if self.fail_list_pods {
                bail!("forbidden");
            }
            Ok(self.pods.clone())
        }

        async fn list_containers(&self, _namespace: &str, pod: &str) -> Result<Vec<String>> {
            self.list_containers_calls.fetch_add(1, Ordering::SeqCst);
            self.enter().await;
            if self.broken_pods.contains(pod) {
                bail!("pod {pod} not found");
            }
            self.containers
                .get(pod)
                .cloned()
                .ok_or_else(|| anyhow!("pod {pod} not found"))
        }

        async fn fetch_logs(
            &self,
            _namespace: &str,
            pod: &str,
            container: &str,
            _options: &FetchOptions,
        ) -> Result<Vec<u8>> {
            self.enter().await;
            let key = (pod.to_string(), container.to_string());
            if self.broken_containers.contains(&key) {
                bail!("stream reset");
            }
            self.logs
                .get(&key)
                .map(|log| log.clone().into_bytes())
                .ok_or_else(|| anyhow!("container {container} not found"))
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<RetrievalFailure>>);

    impl FailureSink for RecordingSink {
        fn report(&self, failure: &RetrievalFailure) {
            self.0.lock().push(failure.clone());
        }
    }

    async fn run(
        fake: FakeCluster,
        target: RetrievalTarget,
        config: CollectorConfig,
    ) -> (
        Arc<FakeCluster>,
        LogStore,
        RecordingSink,
        Result<RetrievalSummary, RetrievalError>,
    ) {
        let fake = Arc::new(fake);
        let collector = LogCollector::new(fake.clone(), config);
        let store = LogStore::new();
        let sink = RecordingSink::default();
        let result = collector.collect(&target, &store, &sink).await;
        (fake, store, sink, result)
    }

    #[tokio::test]
    async fn test_collects_every_line() {
        let (_, store, sink, result) = run(
            FakeCluster::grid(3, 2, 5),
            RetrievalTarget::namespace("ns"),
            CollectorConfig::default(),
        )
        .await;

        let summary = result.unwrap();
        assert_eq!(store.len(), 3 * 2 * 5);
        assert_eq!(
            summary,
            RetrievalSummary {
                pods: 3,
                containers: 6,
                entries: 30,
                failures: 0
            }
        );
        assert!(sink.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_is_isolated() {
        let mut fake = FakeCluster::grid(2, 3, 4);
        fake.broken_containers
            .insert(("pod-1".to_string(), "c-2".to_string()));

        let (_, store, sink, result) =
            run(fake, RetrievalTarget::namespace("ns"), CollectorConfig::default()).await;

        let summary = result.unwrap();
        assert_eq!(store.len(), (2 * 3 - 1) * 4);
        assert_eq!(summary.failures, 1);

        let failures = sink.0.lock();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].pod, "pod-1");
        assert_eq!(failures[0].container.as_deref(), Some("c-2"));
        assert_eq!(
            failures[0].to_string(),
            "failed to retrieve logs for pod pod-1, container c-2: stream reset"
        );
        assert!(store.snapshot().iter().all(|e| !(e.pod_name == "pod-1" && e.container == "c-2")));
    }

    #[tokio::test]
    async fn test_failed_container_listing_skips_pod() {
        let mut fake = FakeCluster::grid(3, 2, 2);
        fake.broken_pods.insert("pod-0".to_string());

        let (_, store, sink, result) =
            run(fake, RetrievalTarget::namespace("ns"), CollectorConfig::default()).await;

        let summary = result.unwrap();
        assert_eq!(summary.containers, 4);
        assert_eq!(store.len(), 2 * 2 * 2);
        assert!(store.snapshot().iter().all(|e| e.pod_name != "pod-0"));

        let failures = sink.0.lock();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].container, None);
        assert!(failures[0].to_string().starts_with("failed to list containers for pod pod-0"));
    }

    #[tokio::test]
    async fn test_pod_listing_failure_is_fatal() {
        let mut fake = FakeCluster::grid(2, 2, 2);
        fake.fail_list_pods = true;

        let (fake, store, _, result) =
            run(fake, RetrievalTarget::namespace("prod"), CollectorConfig::default()).await;

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "failed to list pods in namespace prod");
        assert!(store.is_empty());
        assert_eq!(fake.list_containers_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_explicit_pod_and_container() {
        let target = RetrievalTarget::namespace("ns")
            .with_pod("pod-1")
            .with_container("c-0");
        let (fake, store, _, result) =
            run(FakeCluster::grid(3, 3, 3), target, CollectorConfig::default()).await;

        assert_eq!(result.unwrap().entries, 3);
        assert!(store
            .snapshot()
            .iter()
            .all(|e| e.pod_name == "pod-1" && e.container == "c-0"));
        assert_eq!(fake.list_pods_calls.load(Ordering::SeqCst), 0);
        assert_eq!(fake.list_containers_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_explicit_pod_lists_its_containers() {
        let target = RetrievalTarget::namespace("ns").with_pod("pod-2");
        let (fake, store, _, result) =
            run(FakeCluster::grid(3, 2, 1), target, CollectorConfig::default()).await;

        assert_eq!(result.unwrap().containers, 2);
        assert_eq!(store.len(), 2);
        assert_eq!(fake.list_containers_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_selector_reaches_pod_listing() {
        let mut target = RetrievalTarget::namespace("ns");
        target.selector = Some("app=web".to_string());
        let (fake, _, _, result) =
            run(FakeCluster::grid(1, 1, 1), target, CollectorConfig::default()).await;

        result.unwrap();
        assert_eq!(fake.last_selector.lock().as_deref(), Some("app=web"));
    }

    #[tokio::test]
    async fn test_empty_namespace() {
        let (_, store, sink, result) = run(
            FakeCluster::default(),
            RetrievalTarget::namespace("ns"),
            CollectorConfig::default(),
        )
        .await;

        assert_eq!(result.unwrap(), RetrievalSummary::default());
        assert!(store.is_empty());
        assert!(sink.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let config = CollectorConfig {
            max_concurrency: 3,
            ..Default::default()
        };
        let fake = FakeCluster::grid(4, 4, 2).with_delay(Duration::from_millis(20));

        let (fake, store, _, result) = run(fake, RetrievalTarget::namespace("ns"), config).await;

        result.unwrap();
        assert_eq!(store.len(), 4 * 4 * 2);
        let peak = fake.max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight calls was {peak}");
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_oversized_limits_are_clamped() {
        let config = CollectorConfig {
            max_concurrency: usize::MAX,
            channel_capacity: usize::MAX,
            ..Default::default()
        };

        let (_, store, _, result) =
            run(FakeCluster::grid(2, 2, 3), RetrievalTarget::namespace("ns"), config).await;

        result.unwrap();
        assert_eq!(store.len(), 2 * 2 * 3);
    }

    #[tokio::test]
    async fn test_empty_namespace_is_rejected() {
        let (fake, store, _, result) = run(
            FakeCluster::grid(1, 1, 1),
            RetrievalTarget::namespace("  "),
            CollectorConfig::default(),
        )
        .await;

        assert!(matches!(result, Err(RetrievalError::EmptyNamespace)));
        assert!(store.is_empty());
        assert_eq!(fake.list_containers_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_container_line_order_preserved() {
        let config = CollectorConfig {
            channel_capacity: 1,
            ..Default::default()
        };
        let (_, store, _, result) = run(
            FakeCluster::grid(3, 3, 20),
            RetrievalTarget::namespace("ns"),
            config,
        )
        .await;
        result.unwrap();

        let snapshot = store.snapshot();
        for p in 0..3 {
            for c in 0..3 {
                let pod = format!("pod-{p}");
                let container = format!("c-{c}");
                let lines: Vec<String> = snapshot
                    .iter()
                    .filter(|e| e.pod_name == pod && e.container == container)
                    .map(|e| e.content.clone())
                    .collect();
                let expected: Vec<String> = (0..20)
                    .map(|l| format!("{pod}/{container} line {l}"))
                    .collect();
                assert_eq!(lines, expected);
            }
        }
    }

    #[test]
    fn test_config_defaults_from_partial_toml() {
        let config: CollectorConfig =
            toml::from_str("max_concurrency = 4\nsince = \"1h\"").unwrap();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.channel_capacity, 100);
        assert_eq!(config.since, TimeRange::Last1h);
    }
}
