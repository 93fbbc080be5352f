//! Cluster access through the Kubernetes API server

use super::{ClusterQuery, LogSource, PodOutcome};
use crate::error::{Error, Result};
use crate::models::Deployment;
use async_trait::async_trait;
use futures_util::io::AsyncBufReadExt;
use futures_util::TryStreamExt;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, ListParams, LogParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::runtime::wait::await_condition;
use kube::Client;
use tokio::sync::mpsc;
use tracing::debug;

/// Kubernetes-backed cluster queries
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    /// Custom resource that represents a deployment of the job runtime
    deployment_resource: ApiResource,
}

impl KubeCluster {
    /// Create a cluster handle that resolves deployments as `FlinkDeployment`s
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk("flink.apache.org", "v1beta1", "FlinkDeployment");
        Self {
            client,
            deployment_resource: ApiResource::from_gvk_with_plural(&gvk, "flinkdeployments"),
        }
    }

    /// Override the custom resource used for deployment lookups
    pub fn with_deployment_resource(mut self, resource: ApiResource) -> Self {
        self.deployment_resource = resource;
        self
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterQuery for KubeCluster {
    async fn deployment_exists(&self, deployment: &Deployment) -> Result<bool> {
        let api: Api<DynamicObject> = Api::namespaced_with(
            self.client.clone(),
            &deployment.namespace,
            &self.deployment_resource,
        );
        Ok(api.get_opt(&deployment.name).await?.is_some())
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<String>> {
        let pods = self
            .pods(namespace)
            .list(&ListParams::default().labels(selector))
            .await?;
        let names: Vec<String> = pods
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .collect();
        debug!(namespace = %namespace, selector = %selector, count = names.len(), "Listed pods");
        Ok(names)
    }

    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.is_some())
    }
}

#[async_trait]
impl LogSource for KubeCluster {
    async fn follow_log(
        &self,
        namespace: &str,
        pod: &str,
        lines: mpsc::Sender<String>,
    ) -> Result<()> {
        let params = LogParams {
            follow: true,
            ..Default::default()
        };
        let stream = self.pods(namespace).log_stream(pod, &params).await?;
        let mut reader = stream.lines();

        while let Some(line) = reader.try_next().await? {
            if lines.send(line).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn wait_for_completion(&self, namespace: &str, pod: &str) -> Result<PodOutcome> {
        let terminated =
            |obj: Option<&Pod>| phase_of(obj).and_then(PodOutcome::from_phase).is_some();

        let finished = await_condition(self.pods(namespace), pod, terminated)
            .await
            .map_err(|e| Error::Watch {
                pod: pod.to_string(),
                reason: e.to_string(),
            })?;

        phase_of(finished.as_ref())
            .and_then(PodOutcome::from_phase)
            .ok_or_else(|| Error::Watch {
                pod: pod.to_string(),
                reason: "pod disappeared before reaching a terminal phase".to_string(),
            })
    }

    async fn collect_log(&self, namespace: &str, pod: &str) -> Result<String> {
        Ok(self
            .pods(namespace)
            .logs(pod, &LogParams::default())
            .await?)
    }
}

fn phase_of(pod: Option<&Pod>) -> Option<&str> {
    pod?.status.as_ref()?.phase.as_deref()
}
