use anyhow::Result;
use async_trait::async_trait;

use kubesift_types::FetchOptions;

/// Read access to the pods and container logs of a cluster
///
/// The log collector only talks to the cluster through this trait, so any
/// error returned here is treated as a failure of that single call.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// Names of the pods in `namespace`, optionally restricted by a label selector
    async fn list_pods(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<String>>;

    /// Names of the containers declared in the pod spec, in spec order
    async fn list_containers(&self, namespace: &str, pod: &str) -> Result<Vec<String>>;

    /// Whole log of one container, read into memory
    async fn fetch_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        options: &FetchOptions,
    ) -> Result<Vec<u8>>;
}
