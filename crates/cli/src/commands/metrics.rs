//! Container metric commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, ContainerMetricInfo};
use crate::output::{
    format_bytes, format_cpu, format_timestamp, print_info, print_json, print_table, OutputFormat,
};

#[derive(Tabled)]
pub struct MetricRow {
    #[tabled(rename = "Time")]
    timestamp: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
}

pub fn metric_rows(samples: &[ContainerMetricInfo]) -> Vec<MetricRow> {
    samples
        .iter()
        .map(|m| MetricRow {
            timestamp: format_timestamp(m.creation_date),
            namespace: m.namespace.clone(),
            pod: m.podname.clone(),
            container: m.container_name.clone(),
            cpu: format_cpu(m.cpu_usage),
            memory: format_bytes(m.memory_usage),
        })
        .collect()
}

/// Downsampled samples across the cluster, optionally for one namespace
pub async fn show_metrics(
    client: &ApiClient,
    rate: &str,
    namespace: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut query = vec![("rate", rate)];
    if let Some(ns) = namespace.as_deref() {
        query.push(("namespace", ns));
    }

    let samples: Vec<ContainerMetricInfo> =
        client.get("api/v1/container-metrics", &query).await?;

    match format {
        OutputFormat::Json => print_json(&samples)?,
        OutputFormat::Table => {
            let total = samples.len();
            print_table(metric_rows(&samples), "No metrics recorded");
            if total > 0 {
                print_info(&format!("{} samples, one per container every {}", total, rate));
            }
        }
    }

    Ok(())
}
