//! Workload records: deployments, daemonsets, statefulsets, pods, jobs and
//! cronjobs sharing one [`GeneralInfo`] block and a per-kind status.

use super::{Container, Labels};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Kind of a workload, stored as the `workload_type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadKind {
    Deployment,
    #[serde(rename = "Daemonset")]
    DaemonSet,
    #[serde(rename = "Statefulset")]
    StatefulSet,
    Pod,
    Job,
    #[serde(rename = "Cronjob")]
    CronJob,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 6] = [
        WorkloadKind::Deployment,
        WorkloadKind::DaemonSet,
        WorkloadKind::StatefulSet,
        WorkloadKind::Pod,
        WorkloadKind::Job,
        WorkloadKind::CronJob,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::DaemonSet => "Daemonset",
            WorkloadKind::StatefulSet => "Statefulset",
            WorkloadKind::Pod => "Pod",
            WorkloadKind::Job => "Job",
            WorkloadKind::CronJob => "Cronjob",
        }
    }

    /// Plural path segment used by the REST API (`deployments`, `pods`, ...).
    pub fn plural(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "deployments",
            WorkloadKind::DaemonSet => "daemonsets",
            WorkloadKind::StatefulSet => "statefulsets",
            WorkloadKind::Pod => "pods",
            WorkloadKind::Job => "jobs",
            WorkloadKind::CronJob => "cronjobs",
        }
    }

    pub fn from_plural(plural: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.plural().eq_ignore_ascii_case(plural))
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownWorkloadType(s.to_string()))
    }
}

/// Fields every workload carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralInfo {
    #[serde(rename = "workload_name")]
    pub name: String,
    pub namespace: String,
    pub labels: Labels,
    pub annotations: Labels,
    pub selector: Labels,
    pub containers: Vec<Container>,
    #[serde(rename = "creation_date")]
    pub creation_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub desired: i32,
    pub ready: i32,
    pub available: i32,
    #[serde(rename = "up2date")]
    pub up_to_date: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonSetStatus {
    pub desired: i32,
    pub current: i32,
    pub ready: i32,
    #[serde(rename = "up2date")]
    pub up_to_date: i32,
    pub available: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatefulSetStatus {
    pub replicas: i32,
    pub current: i32,
    pub ready: i32,
    #[serde(rename = "up2date")]
    pub up_to_date: i32,
    pub available: i32,
}

/// Controller that owns a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodOwner {
    pub api_version: String,
    pub kind: String,
    pub uid: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    pub phase: String,
    /// Highest restart count among the pod's containers.
    pub restarts: i32,
    #[serde(default)]
    pub owners: Vec<PodOwner>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub active: i32,
    pub ready: Option<i32>,
    pub failed: i32,
    pub succeeded: i32,
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
}

/// Reference to a job spawned by a cronjob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveJob {
    pub api_version: String,
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronJobStatus {
    pub schedule: String,
    pub suspend: Option<bool>,
    pub concurrency_policy: String,
    pub backoff_limit: Option<i32>,
    pub failed_jobs_history: Option<i32>,
    pub successful_jobs_history: Option<i32>,
    #[serde(rename = "active_jobs")]
    pub active: Vec<ActiveJob>,
    pub last_scheduled_time: Option<DateTime<Utc>>,
    pub last_successful_time: Option<DateTime<Utc>>,
}

/// Per-kind status block. The variant is the workload's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "status")]
pub enum WorkloadStatus {
    Deployment(DeploymentStatus),
    #[serde(rename = "Daemonset")]
    DaemonSet(DaemonSetStatus),
    #[serde(rename = "Statefulset")]
    StatefulSet(StatefulSetStatus),
    Pod(PodStatus),
    Job(JobStatus),
    #[serde(rename = "Cronjob")]
    CronJob(CronJobStatus),
}

impl WorkloadStatus {
    pub fn kind(&self) -> WorkloadKind {
        match self {
            WorkloadStatus::Deployment(_) => WorkloadKind::Deployment,
            WorkloadStatus::DaemonSet(_) => WorkloadKind::DaemonSet,
            WorkloadStatus::StatefulSet(_) => WorkloadKind::StatefulSet,
            WorkloadStatus::Pod(_) => WorkloadKind::Pod,
            WorkloadStatus::Job(_) => WorkloadKind::Job,
            WorkloadStatus::CronJob(_) => WorkloadKind::CronJob,
        }
    }

    /// Encode only the inner status block, without the kind tag.
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            WorkloadStatus::Deployment(s) => serde_json::to_string(s),
            WorkloadStatus::DaemonSet(s) => serde_json::to_string(s),
            WorkloadStatus::StatefulSet(s) => serde_json::to_string(s),
            WorkloadStatus::Pod(s) => serde_json::to_string(s),
            WorkloadStatus::Job(s) => serde_json::to_string(s),
            WorkloadStatus::CronJob(s) => serde_json::to_string(s),
        }
    }

    /// Decode an inner status block for the given kind.
    pub fn from_json(kind: WorkloadKind, raw: &str) -> serde_json::Result<Self> {
        Ok(match kind {
            WorkloadKind::Deployment => WorkloadStatus::Deployment(serde_json::from_str(raw)?),
            WorkloadKind::DaemonSet => WorkloadStatus::DaemonSet(serde_json::from_str(raw)?),
            WorkloadKind::StatefulSet => WorkloadStatus::StatefulSet(serde_json::from_str(raw)?),
            WorkloadKind::Pod => WorkloadStatus::Pod(serde_json::from_str(raw)?),
            WorkloadKind::Job => WorkloadStatus::Job(serde_json::from_str(raw)?),
            WorkloadKind::CronJob => WorkloadStatus::CronJob(serde_json::from_str(raw)?),
        })
    }
}

/// A normalized workload snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    #[serde(rename = "workload_info")]
    pub info: GeneralInfo,
    #[serde(flatten)]
    pub status: WorkloadStatus,
}

impl Workload {
    pub fn new(info: GeneralInfo, status: WorkloadStatus) -> Self {
        Self { info, status }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn kind(&self) -> WorkloadKind {
        self.status.kind()
    }

    pub fn namespace(&self) -> &str {
        &self.info.namespace
    }

    pub fn labels(&self) -> &Labels {
        &self.info.labels
    }

    pub fn annotations(&self) -> &Labels {
        &self.info.annotations
    }

    pub fn selector(&self) -> &Labels {
        &self.info.selector
    }

    pub fn containers(&self) -> &[Container] {
        &self.info.containers
    }

    pub fn creation_timestamp(&self) -> DateTime<Utc> {
        self.info.creation_timestamp
    }

    pub fn status(&self) -> &WorkloadStatus {
        &self.status
    }

    /// Restart count for pods, zero for every other kind.
    pub fn restarts(&self) -> i32 {
        match &self.status {
            WorkloadStatus::Pod(status) => status.restarts,
            _ => 0,
        }
    }

    /// Collection key: `{namespace}_{name}`.
    pub fn key(&self) -> String {
        workload_key(&self.info.namespace, &self.info.name)
    }
}

pub fn workload_key(namespace: &str, name: &str) -> String {
    format!("{namespace}_{name}")
}

/// True when every selector pair is present in `labels`. An empty selector
/// matches everything.
pub fn selector_matches(selector: &Labels, labels: &Labels) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|label| label == v))
}
