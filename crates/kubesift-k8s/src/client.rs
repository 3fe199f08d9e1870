use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::AsyncReadExt;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::{ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use tracing::debug;

use crate::ClusterSource;
use kubesift_types::FetchOptions;

/// Kubernetes client wrapper
#[derive(Clone)]
pub struct KubeClient {
    client: kube::Client,
    context: Option<String>,
}

impl KubeClient {
    /// Create a client from a kubeconfig file
    ///
    /// Without a path the usual discovery applies (`$KUBECONFIG`, then
    /// `~/.kube/config`). Without a context name the kubeconfig's current
    /// context is used.
    pub async fn new(kubeconfig_path: Option<&Path>, context: Option<&str>) -> Result<Self> {
        let kubeconfig = match kubeconfig_path {
            Some(path) => Kubeconfig::read_from(path).context(format!(
                "Failed to read kubeconfig from {}",
                path.display()
            ))?,
            None => {
                Kubeconfig::read().context("Failed to read kubeconfig. Is kubectl configured?")?
            }
        };

        let context = context
            .map(str::to_string)
            .or_else(|| kubeconfig.current_context.clone());

        let config = kube::Config::from_custom_kubeconfig(
            kubeconfig,
            &KubeConfigOptions {
                context: context.clone(),
                ..Default::default()
            },
        )
        .await
        .context(format!(
            "Failed to create config for context: {}",
            context.as_deref().unwrap_or("<current>")
        ))?;

        let client = kube::Client::try_from(config).context(format!(
            "Failed to create client for context: {}",
            context.as_deref().unwrap_or("<current>")
        ))?;

        Ok(Self { client, context })
    }

    /// Get the context name this client was built for
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterSource for KubeClient {
    async fn list_pods(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<String>> {
        let mut params = ListParams::default();
        if let Some(selector) = selector {
            params = params.labels(selector);
        }

        let list = self
            .pods(namespace)
            .list(&params)
            .await
            .context(format!("Failed to list pods in {}", namespace))?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .collect())
    }

    async fn list_containers(&self, namespace: &str, pod: &str) -> Result<Vec<String>> {
        let pod_spec = self.pods(namespace).get(pod).await.context(format!(
            "Failed to get pod '{}' in namespace '{}'",
            pod, namespace
        ))?;

        Ok(pod_spec
            .spec
            .map(|spec| spec.containers.into_iter().map(|c| c.name).collect())
            .unwrap_or_default())
    }

    async fn fetch_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        options: &FetchOptions,
    ) -> Result<Vec<u8>> {
        let params = LogParams {
            follow: false,
            container: Some(container.to_string()),
            tail_lines: options.tail_lines,
            since_seconds: options.since_seconds,
            ..Default::default()
        };

        let stream = self
            .pods(namespace)
            .log_stream(pod, &params)
            .await
            .context("error opening log stream")?;
        futures::pin_mut!(stream);

        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .await
            .context("error reading logs")?;

        debug!(namespace, pod, container, bytes = buf.len(), "read container log");
        Ok(buf)
    }
}
