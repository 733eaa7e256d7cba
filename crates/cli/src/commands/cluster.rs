//! Namespace and node commands

use anyhow::Result;
use chrono::Utc;
use tabled::Tabled;

use crate::client::{ApiClient, EventInfo, NamespaceDetail, NamespaceInfo, NodeInfo};
use crate::commands::workloads::workload_rows;
use crate::output::{
    color_status, format_age, print_heading, print_json, print_table, OutputFormat,
};

#[derive(Tabled)]
struct NamespaceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Age")]
    age: String,
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Roles")]
    roles: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Kubelet")]
    kubelet_version: String,
    #[tabled(rename = "OS Image")]
    os_image: String,
    #[tabled(rename = "Age")]
    age: String,
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Last Seen")]
    last_seen: String,
    #[tabled(rename = "Type")]
    event_type: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Object")]
    object: String,
    #[tabled(rename = "Count")]
    count: i32,
    #[tabled(rename = "Message")]
    message: String,
}

fn namespace_row(ns: &NamespaceInfo) -> NamespaceRow {
    NamespaceRow {
        name: ns.name.clone(),
        status: color_status(&ns.status),
        age: format_age(ns.creation_date, Utc::now()),
    }
}

fn event_rows(events: &[EventInfo]) -> Vec<EventRow> {
    let now = Utc::now();
    events
        .iter()
        .map(|e| EventRow {
            last_seen: e
                .last_seen
                .map(|ts| format_age(ts, now))
                .unwrap_or_else(|| "-".to_string()),
            event_type: color_status(&e.event_type),
            reason: e.reason.clone(),
            object: e.object.clone(),
            count: e.count,
            message: e.message.clone(),
        })
        .collect()
}

pub async fn list_namespaces(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let namespaces: Vec<NamespaceInfo> = client.get("api/v1/namespaces", &[]).await?;

    match format {
        OutputFormat::Json => print_json(&namespaces)?,
        OutputFormat::Table => {
            print_table(
                namespaces.iter().map(namespace_row).collect(),
                "No namespaces found",
            );
        }
    }

    Ok(())
}

/// Namespace overview with its workloads and recent events
pub async fn show_namespace(client: &ApiClient, name: &str, format: OutputFormat) -> Result<()> {
    let detail: NamespaceDetail = client
        .get(&format!("api/v1/namespaces/{}", name), &[])
        .await?;

    match format {
        OutputFormat::Json => print_json(&detail)?,
        OutputFormat::Table => {
            print_table(vec![namespace_row(&detail.namespace)], "Namespace not found");

            print_heading("Workloads");
            print_table(workload_rows(&detail.workloads), "No workloads in this namespace");

            print_heading("Events");
            print_table(event_rows(&detail.events), "No recent events");
        }
    }

    Ok(())
}

pub async fn list_nodes(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let nodes: Vec<NodeInfo> = client.get("api/v1/nodes", &[]).await?;

    match format {
        OutputFormat::Json => print_json(&nodes)?,
        OutputFormat::Table => {
            let now = Utc::now();
            let rows = nodes
                .iter()
                .map(|n| NodeRow {
                    name: n.name.clone(),
                    status: color_status(&n.status),
                    roles: if n.roles.is_empty() {
                        "<none>".to_string()
                    } else {
                        n.roles.clone()
                    },
                    cpu: n.cpu.to_string(),
                    memory: format!("{}M", n.memory),
                    kubelet_version: n.kubelet_version.clone(),
                    os_image: n.os_image.clone(),
                    age: format_age(n.creation_date, now),
                })
                .collect();
            print_table(rows, "No nodes found");
        }
    }

    Ok(())
}
