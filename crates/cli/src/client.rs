//! API client for the kdd REST API

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the kdd daemon
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

/// Wrapper around every `/api/v1` payload
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: u16,
    msg: String,
    data: T,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// GET `path` with query parameters and unwrap the envelope.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let mut url = self.base_url.join(path).context("Invalid path")?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Error envelopes carry the detail in `data`.
            let detail = serde_json::from_str::<Envelope<String>>(&body)
                .map(|e| format!("{}: {}", e.msg, e.data))
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, detail);
        }

        let envelope: Envelope<T> = response.json().await.context("Failed to parse response")?;
        anyhow::ensure!(
            envelope.code == 200,
            "API error ({}): {}",
            envelope.code,
            envelope.msg
        );
        Ok(envelope.data)
    }
}

// API response types

pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub labels: Labels,
    pub creation_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub status: String,
    /// Whole cores
    pub cpu: i64,
    /// Megabytes
    pub memory: i64,
    pub os_image: String,
    pub kubelet_version: String,
    pub roles: String,
    pub creation_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub container_name: String,
    pub image: String,
    pub image_version: String,
    pub request_cpu: i64,
    pub request_memory: i64,
    pub limit_cpu: i64,
    pub limit_memory: i64,
    pub restarts: i32,
    pub init_container: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralInfo {
    pub workload_name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub selector: Labels,
    #[serde(default)]
    pub containers: Vec<ContainerInfo>,
    pub creation_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadInfo {
    pub workload_info: GeneralInfo,
    #[serde(rename = "type")]
    pub kind: String,
    /// Kind-specific status block
    pub status: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerMetricInfo {
    pub podname: String,
    pub namespace: String,
    pub container_name: String,
    /// Millicores
    pub cpu_usage: i64,
    /// Bytes
    pub memory_usage: i64,
    pub creation_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventInfo {
    pub last_seen: Option<DateTime<Utc>>,
    pub count: i32,
    #[serde(rename = "type")]
    pub event_type: String,
    pub reason: String,
    pub object: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceDetail {
    pub namespace: NamespaceInfo,
    pub workloads: Vec<WorkloadInfo>,
    pub events: Vec<EventInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadDetail {
    pub workload: WorkloadInfo,
    pub pods: Vec<WorkloadInfo>,
    pub metrics: Vec<ContainerMetricInfo>,
}
