//! `metrics.k8s.io/v1beta1` pod usage resource, served by metrics-server.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct PodMetricsContainer {
    pub name: String,
    pub usage: ContainerUsage,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct ContainerUsage {
    pub cpu: Option<Quantity>,
    pub memory: Option<Quantity>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct PodMetrics {
    pub metadata: ObjectMeta,
    /// RFC 3339 time the usage window ended.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub window: Option<String>,
    #[serde(default)]
    pub containers: Vec<PodMetricsContainer>,
}

impl k8s_openapi::Resource for PodMetrics {
    type Scope = k8s_openapi::NamespaceResourceScope;

    const API_VERSION: &'static str = "metrics.k8s.io/v1beta1";
    const GROUP: &'static str = "metrics.k8s.io";
    const KIND: &'static str = "PodMetrics";
    const URL_PATH_SEGMENT: &'static str = "pods";
    const VERSION: &'static str = "v1beta1";
}

impl k8s_openapi::Metadata for PodMetrics {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}
