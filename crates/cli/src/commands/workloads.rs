//! Workload commands

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use tabled::Tabled;

use crate::client::{ApiClient, WorkloadDetail, WorkloadInfo};
use crate::commands::metrics::metric_rows;
use crate::output::{
    color_status, format_age, format_bytes, format_cpu, print_heading, print_json, print_table,
    OutputFormat,
};

/// Plural kinds accepted by the API
pub const KINDS: [&str; 6] = [
    "deployments",
    "daemonsets",
    "statefulsets",
    "pods",
    "jobs",
    "cronjobs",
];

#[derive(Tabled)]
pub struct WorkloadRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Containers")]
    containers: usize,
    #[tabled(rename = "Age")]
    age: String,
}

#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "CPU Req")]
    request_cpu: String,
    #[tabled(rename = "CPU Lim")]
    limit_cpu: String,
    #[tabled(rename = "Mem Req")]
    request_memory: String,
    #[tabled(rename = "Mem Lim")]
    limit_memory: String,
    #[tabled(rename = "Restarts")]
    restarts: i32,
    #[tabled(rename = "Init")]
    init: bool,
}

fn int(status: &Value, field: &str) -> i64 {
    status[field].as_i64().unwrap_or_default()
}

/// One-line status for a workload, shaped by its type
pub fn status_summary(workload: &WorkloadInfo) -> String {
    let status = &workload.status;
    match workload.kind.as_str() {
        "Deployment" | "Daemonset" => {
            format!("{}/{} ready", int(status, "ready"), int(status, "desired"))
        }
        "Statefulset" => format!("{}/{} ready", int(status, "ready"), int(status, "replicas")),
        "Pod" => {
            let phase = status["phase"].as_str().unwrap_or("Unknown");
            match int(status, "restarts") {
                0 => color_status(phase),
                restarts => format!("{} ({} restarts)", color_status(phase), restarts),
            }
        }
        "Job" => format!(
            "{} active, {} succeeded, {} failed",
            int(status, "active"),
            int(status, "succeeded"),
            int(status, "failed")
        ),
        "Cronjob" => {
            let schedule = status["schedule"].as_str().unwrap_or_default();
            if status["suspend"].as_bool().unwrap_or(false) {
                format!("{} (suspended)", schedule)
            } else {
                schedule.to_string()
            }
        }
        _ => "-".to_string(),
    }
}

pub fn workload_rows(workloads: &[WorkloadInfo]) -> Vec<WorkloadRow> {
    let now = Utc::now();
    workloads
        .iter()
        .map(|w| WorkloadRow {
            namespace: w.workload_info.namespace.clone(),
            name: w.workload_info.workload_name.clone(),
            kind: w.kind.clone(),
            status: status_summary(w),
            containers: w.workload_info.containers.len(),
            age: format_age(w.workload_info.creation_date, now),
        })
        .collect()
}

fn check_kind(kind: &str) -> Result<()> {
    anyhow::ensure!(
        KINDS.contains(&kind),
        "Unknown workload kind '{}', expected one of: {}",
        kind,
        KINDS.join(", ")
    );
    Ok(())
}

pub async fn list_workloads(
    client: &ApiClient,
    kind: Option<String>,
    namespace: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let workloads: Vec<WorkloadInfo> = match &kind {
        Some(kind) => {
            check_kind(kind)?;
            let query: Vec<(&str, &str)> = namespace
                .as_deref()
                .map(|ns| vec![("namespace", ns)])
                .unwrap_or_default();
            client
                .get(&format!("api/v1/workloads/{}", kind), &query)
                .await?
        }
        None => {
            let all: Vec<WorkloadInfo> = client.get("api/v1/workloads", &[]).await?;
            all.into_iter()
                .filter(|w| {
                    namespace
                        .as_ref()
                        .map(|ns| &w.workload_info.namespace == ns)
                        .unwrap_or(true)
                })
                .collect()
        }
    };

    match format {
        OutputFormat::Json => print_json(&workloads)?,
        OutputFormat::Table => {
            let total = workloads.len();
            print_table(workload_rows(&workloads), "No workloads found");
            if total > 0 {
                println!("\nTotal: {} workloads", total);
            }
        }
    }

    Ok(())
}

/// Workload with its pods and downsampled container metrics
pub async fn show_workload(
    client: &ApiClient,
    kind: &str,
    namespace: &str,
    name: &str,
    rate: &str,
    format: OutputFormat,
) -> Result<()> {
    check_kind(kind)?;

    let detail: WorkloadDetail = client
        .get(
            &format!("api/v1/workloads/{}/{}/{}", kind, namespace, name),
            &[("rate", rate)],
        )
        .await?;

    match format {
        OutputFormat::Json => print_json(&detail)?,
        OutputFormat::Table => {
            print_table(workload_rows(std::slice::from_ref(&detail.workload)), "");

            let containers = detail
                .workload
                .workload_info
                .containers
                .iter()
                .map(|c| ContainerRow {
                    name: c.container_name.clone(),
                    image: c.image.clone(),
                    version: c.image_version.clone(),
                    request_cpu: format_cpu(c.request_cpu),
                    limit_cpu: format_cpu(c.limit_cpu),
                    request_memory: format_bytes(c.request_memory),
                    limit_memory: format_bytes(c.limit_memory),
                    restarts: c.restarts,
                    init: c.init_container,
                })
                .collect();
            print_heading("Containers");
            print_table(containers, "No containers");

            print_heading("Pods");
            print_table(workload_rows(&detail.pods), "No matching pods");

            print_heading(&format!("Metrics (one sample per {})", rate));
            print_table(metric_rows(&detail.metrics), "No metrics recorded");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GeneralInfo;
    use serde_json::json;

    fn workload(kind: &str, status: Value) -> WorkloadInfo {
        WorkloadInfo {
            workload_info: GeneralInfo {
                workload_name: "web".into(),
                namespace: "shop".into(),
                labels: Default::default(),
                selector: Default::default(),
                containers: vec![],
                creation_date: Utc::now(),
            },
            kind: kind.into(),
            status,
        }
    }

    #[test]
    fn test_status_summary_per_kind() {
        colored::control::set_override(false);

        let deploy = workload("Deployment", json!({"desired": 3, "ready": 2}));
        assert_eq!(status_summary(&deploy), "2/3 ready");

        let sts = workload("Statefulset", json!({"replicas": 2, "ready": 2}));
        assert_eq!(status_summary(&sts), "2/2 ready");

        let pod = workload("Pod", json!({"phase": "Running", "restarts": 4}));
        assert_eq!(status_summary(&pod), "Running (4 restarts)");

        let cron = workload("Cronjob", json!({"schedule": "*/5 * * * *", "suspend": true}));
        assert_eq!(status_summary(&cron), "*/5 * * * * (suspended)");
    }

    #[test]
    fn test_check_kind() {
        assert!(check_kind("statefulsets").is_ok());
        assert!(check_kind("replicasets").is_err());
    }
}
