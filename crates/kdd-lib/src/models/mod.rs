//! Normalized cluster records shared by the collector, the store and the API.

mod collection;
mod workload;

pub use collection::{compare_collections, Collection};
pub use workload::{
    selector_matches, workload_key, ActiveJob, CronJobStatus, DaemonSetStatus, DeploymentStatus,
    GeneralInfo, JobStatus, PodOwner, PodStatus, StatefulSetStatus, Workload, WorkloadKind,
    WorkloadStatus,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Labels, annotations and selectors. Ordered so encoded JSON is stable.
pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    pub status: String,
    pub labels: Labels,
    pub annotations: Labels,
    #[serde(rename = "creation_date")]
    pub creation_timestamp: DateTime<Utc>,
}

impl Namespace {
    pub fn key(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    /// Reason reported by the `Ready` condition.
    pub status: String,
    /// Allocatable CPU in whole cores.
    pub cpu: i64,
    /// Allocatable memory in megabytes.
    pub memory: i64,
    pub os_image: String,
    pub kubelet_version: String,
    /// Space separated, sorted role names.
    pub roles: String,
    pub labels: Labels,
    pub annotations: Labels,
    #[serde(rename = "creation_date")]
    pub creation_timestamp: DateTime<Utc>,
}

impl Node {
    pub fn key(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    #[serde(rename = "container_name")]
    pub name: String,
    pub image: String,
    pub image_version: String,
    /// Millicores.
    pub request_cpu: i64,
    /// Bytes.
    pub request_memory: i64,
    pub limit_cpu: i64,
    pub limit_memory: i64,
    pub restarts: i32,
    #[serde(rename = "init_container")]
    pub is_init: bool,
}

/// One resource usage sample for a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetric {
    #[serde(rename = "podname")]
    pub pod_name: String,
    pub namespace: String,
    pub container_name: String,
    /// Millicores.
    pub cpu_usage: i64,
    /// Bytes.
    pub memory_usage: i64,
    #[serde(rename = "creation_date")]
    pub timestamp: DateTime<Utc>,
}

impl ContainerMetric {
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.namespace, self.pod_name, self.container_name)
    }

    /// Key used when several samples of one container share a collection.
    pub fn sample_key(&self) -> String {
        format!("{}_{}", self.key(), self.timestamp.timestamp())
    }
}

/// Cluster event, fetched live and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub last_seen: Option<DateTime<Utc>>,
    pub first_seen: Option<DateTime<Utc>>,
    pub count: i32,
    pub name: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub reason: String,
    pub message: String,
    /// `Kind/name` of the involved object.
    pub object: String,
    /// `component, host`.
    pub source: String,
    #[serde(skip)]
    pub(crate) object_name: String,
}

impl Event {
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.object_name, self.namespace, self.reason)
    }
}
