//! [`ResourceProvider`] backed by a live API server through `kube`.

use super::{async_trait, PodMetrics, ResourceProvider};
use crate::error::{Error, Result};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::path::Path;
use tracing::info;

/// Lists resources across all namespaces with one shared client.
#[derive(Clone)]
pub struct KubeProvider {
    client: Client,
}

impl KubeProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from an explicit kubeconfig file, or fall back to the
    /// in-cluster / `KUBECONFIG` inference when `kubeconfig` is `None`.
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        let client = match kubeconfig {
            Some(path) => {
                info!(path = %path.display(), "Loading kubeconfig");
                let kubeconfig =
                    Kubeconfig::read_from(path).map_err(|e| Error::provider("kubeconfig", e))?;
                let config =
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .map_err(|e| Error::provider("kubeconfig", e))?;
                Client::try_from(config).map_err(|e| Error::provider("client", e))?
            }
            None => Client::try_default()
                .await
                .map_err(|e| Error::provider("client", e))?,
        };

        Ok(Self::new(client))
    }

    async fn list_all<K>(&self, resource: &'static str) -> Result<Vec<K>>
    where
        K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let api: Api<K> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::provider(resource, e))?;
        Ok(list.items)
    }
}

#[async_trait]
impl ResourceProvider for KubeProvider {
    async fn list_namespaces(&self) -> Result<Vec<corev1::Namespace>> {
        let api: Api<corev1::Namespace> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::provider("namespaces", e))?;
        Ok(list.items)
    }

    async fn list_nodes(&self) -> Result<Vec<corev1::Node>> {
        let api: Api<corev1::Node> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::provider("nodes", e))?;
        Ok(list.items)
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>> {
        self.list_all("deployments").await
    }

    async fn list_daemonsets(&self) -> Result<Vec<DaemonSet>> {
        self.list_all("daemonsets").await
    }

    async fn list_statefulsets(&self) -> Result<Vec<StatefulSet>> {
        self.list_all("statefulsets").await
    }

    async fn list_pods(&self) -> Result<Vec<corev1::Pod>> {
        self.list_all("pods").await
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.list_all("jobs").await
    }

    async fn list_cronjobs(&self) -> Result<Vec<CronJob>> {
        self.list_all("cronjobs").await
    }

    async fn list_pod_metrics(&self) -> Result<Vec<PodMetrics>> {
        self.list_all("pod metrics").await
    }

    async fn list_events(&self, namespace: &str) -> Result<Vec<corev1::Event>> {
        let api: Api<corev1::Event> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::provider("events", e))?;
        Ok(list.items)
    }
}
