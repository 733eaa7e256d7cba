//! Workload snapshot collection from the Kubernetes API
//!
//! This module defines the [`ResourceProvider`] boundary over the cluster
//! API and the [`WorkloadCollector`] that turns one round of listings into
//! per-category [`Collection`]s. The collector keeps no state between
//! cycles.

mod kube_provider;
pub mod normalize;
mod pod_metrics;
pub mod quantity;

#[cfg(test)]
mod tests;

pub use kube_provider::KubeProvider;
pub use pod_metrics::{ContainerUsage, PodMetrics, PodMetricsContainer};

use crate::error::Result;
use crate::models::{Collection, ContainerMetric, Event, Namespace, Node, Workload};
use chrono::Utc;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1 as corev1;
use std::sync::Arc;
use tracing::{debug, warn};

pub use async_trait::async_trait;

/// Read access to the cluster resources a sync cycle needs
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn list_namespaces(&self) -> Result<Vec<corev1::Namespace>>;

    async fn list_nodes(&self) -> Result<Vec<corev1::Node>>;

    async fn list_deployments(&self) -> Result<Vec<Deployment>>;

    async fn list_daemonsets(&self) -> Result<Vec<DaemonSet>>;

    async fn list_statefulsets(&self) -> Result<Vec<StatefulSet>>;

    async fn list_pods(&self) -> Result<Vec<corev1::Pod>>;

    async fn list_jobs(&self) -> Result<Vec<Job>>;

    async fn list_cronjobs(&self) -> Result<Vec<CronJob>>;

    /// Pod usage from metrics-server, across all namespaces
    async fn list_pod_metrics(&self) -> Result<Vec<PodMetrics>>;

    async fn list_events(&self, namespace: &str) -> Result<Vec<corev1::Event>>;
}

/// One cycle's worth of normalized records
#[derive(Debug, Default)]
pub struct CollectorResult {
    pub namespaces: Collection<Namespace>,
    pub nodes: Collection<Node>,
    pub workloads: Collection<Workload>,
    pub metrics: Collection<ContainerMetric>,
    /// False when the metrics API could not be queried this cycle
    pub metrics_available: bool,
}

/// Builds per-category collections from a [`ResourceProvider`]
pub struct WorkloadCollector {
    provider: Arc<dyn ResourceProvider>,
}

impl WorkloadCollector {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self { provider }
    }

    /// Fetch and normalize every category.
    ///
    /// Any listing failure other than metrics aborts the whole cycle. A
    /// failing metrics API only leaves the metrics collection empty.
    pub async fn collect(&self) -> Result<CollectorResult> {
        debug!("Requesting cluster resources");
        let provider = &self.provider;

        let (namespaces, nodes, deployments, daemonsets, statefulsets, pods, jobs, cronjobs) = tokio::try_join!(
            provider.list_namespaces(),
            provider.list_nodes(),
            provider.list_deployments(),
            provider.list_daemonsets(),
            provider.list_statefulsets(),
            provider.list_pods(),
            provider.list_jobs(),
            provider.list_cronjobs(),
        )?;

        let mut result = CollectorResult {
            metrics_available: true,
            ..Default::default()
        };

        for ns in &namespaces {
            let record = normalize::namespace(ns);
            result.namespaces.set(record.key(), record, true)?;
        }

        for node in &nodes {
            let record = normalize::node(node);
            result.nodes.set(record.key(), record, true)?;
        }

        let workloads = deployments
            .iter()
            .map(normalize::deployment)
            .chain(daemonsets.iter().map(normalize::daemonset))
            .chain(statefulsets.iter().map(normalize::statefulset))
            .chain(pods.iter().map(normalize::pod))
            .chain(jobs.iter().map(normalize::job))
            .chain(cronjobs.iter().map(normalize::cronjob));
        for workload in workloads {
            result.workloads.set(workload.key(), workload, true)?;
        }

        match provider.list_pod_metrics().await {
            Ok(pod_metrics) => {
                let now = Utc::now();
                for sample in pod_metrics
                    .iter()
                    .flat_map(|pm| normalize::container_metrics(pm, now))
                {
                    result.metrics.set(sample.key(), sample, true)?;
                }
            }
            Err(e) => {
                warn!(error = %e, "Metrics API unavailable, skipping container metrics");
                result.metrics_available = false;
            }
        }

        debug!(
            namespaces = result.namespaces.len(),
            nodes = result.nodes.len(),
            workloads = result.workloads.len(),
            metrics = result.metrics.len(),
            "Cluster resources collected"
        );

        Ok(result)
    }

    /// Live events for one namespace. Later events for the same object and
    /// reason replace earlier ones.
    pub async fn events_for_namespace(&self, namespace: &str) -> Result<Collection<Event>> {
        let events = self.provider.list_events(namespace).await?;
        let collection = Collection::new();

        for event in &events {
            let record = normalize::event(event);
            collection.set(record.key(), record, true)?;
        }

        Ok(collection)
    }
}
