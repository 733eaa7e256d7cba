//! Read paths over the snapshot tables.

use super::{from_unix, Store};
use crate::error::{Error, Result};
use crate::models::{
    selector_matches, Collection, Container, ContainerMetric, GeneralInfo, Labels, Namespace,
    Node, Workload, WorkloadKind, WorkloadStatus,
};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tracing::warn;

/// Column filters for workload queries. Ordered so generated SQL is stable.
pub type Filters = BTreeMap<String, String>;

const FILTER_COLUMNS: [&str; 3] = ["namespace", "workload_name", "workload_type"];

const WORKLOAD_COLUMNS: &str = "key, workload_name, workload_type, namespace, labels, \
     annotations, selector, containers, status, creation_timestamp";

const METRIC_COLUMNS: &str =
    "key, pod_name, namespace, container_name, cpu_usage, memory_usage, creation_timestamp";

struct NamespaceRow {
    key: String,
    name: String,
    status: String,
    labels: String,
    annotations: String,
    created: i64,
}

impl NamespaceRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            name: row.get(1)?,
            status: row.get(2)?,
            labels: row.get(3)?,
            annotations: row.get(4)?,
            created: row.get(5)?,
        })
    }

    fn decode(self) -> Result<(String, Namespace)> {
        let namespace = Namespace {
            name: self.name,
            status: self.status,
            labels: from_json("labels", &self.labels)?,
            annotations: from_json("annotations", &self.annotations)?,
            creation_timestamp: from_unix(self.created),
        };
        Ok((self.key, namespace))
    }
}

struct NodeRow {
    key: String,
    name: String,
    cpu: i64,
    memory: i64,
    os_image: String,
    kubelet_version: String,
    labels: String,
    annotations: String,
    created: i64,
    status: String,
    roles: String,
}

impl NodeRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            name: row.get(1)?,
            cpu: row.get(2)?,
            memory: row.get(3)?,
            os_image: row.get(4)?,
            kubelet_version: row.get(5)?,
            labels: row.get(6)?,
            annotations: row.get(7)?,
            created: row.get(8)?,
            status: row.get(9)?,
            roles: row.get(10)?,
        })
    }

    fn decode(self) -> Result<(String, Node)> {
        let node = Node {
            name: self.name,
            status: self.status,
            cpu: self.cpu,
            memory: self.memory,
            os_image: self.os_image,
            kubelet_version: self.kubelet_version,
            roles: self.roles,
            labels: from_json("labels", &self.labels)?,
            annotations: from_json("annotations", &self.annotations)?,
            creation_timestamp: from_unix(self.created),
        };
        Ok((self.key, node))
    }
}

struct WorkloadRow {
    key: String,
    name: String,
    kind: String,
    namespace: String,
    labels: String,
    annotations: String,
    selector: String,
    containers: String,
    status: String,
    created: i64,
}

impl WorkloadRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            namespace: row.get(3)?,
            labels: row.get(4)?,
            annotations: row.get(5)?,
            selector: row.get(6)?,
            containers: row.get(7)?,
            status: row.get(8)?,
            created: row.get(9)?,
        })
    }

    /// Rebuild the workload, picking the status variant from the stored type.
    fn decode(self) -> Result<(String, Workload)> {
        let kind: WorkloadKind = self.kind.parse()?;
        let status = WorkloadStatus::from_json(kind, &self.status).map_err(|source| {
            Error::Deserialization {
                field: "status",
                source,
            }
        })?;
        let containers: Vec<Container> = from_json("containers", &self.containers)?;

        let info = GeneralInfo {
            name: self.name,
            namespace: self.namespace,
            labels: from_json("labels", &self.labels)?,
            annotations: from_json("annotations", &self.annotations)?,
            selector: from_json::<Labels>("selector", &self.selector)?,
            containers,
            creation_timestamp: from_unix(self.created),
        };
        Ok((self.key, Workload::new(info, status)))
    }
}

fn read_metric(row: &Row<'_>) -> rusqlite::Result<ContainerMetric> {
    Ok(ContainerMetric {
        pod_name: row.get(1)?,
        namespace: row.get(2)?,
        container_name: row.get(3)?,
        cpu_usage: row.get(4)?,
        memory_usage: row.get(5)?,
        timestamp: from_unix(row.get(6)?),
    })
}

fn from_json<T: DeserializeOwned>(field: &'static str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|source| Error::Deserialization { field, source })
}

/// Decode every row, logging and skipping the ones that fail.
fn collect_decoded<R, T>(
    rows: Vec<R>,
    table: &'static str,
    decode: impl Fn(R) -> Result<(String, T)>,
) -> Result<Collection<T>> {
    let collection = Collection::new();
    for row in rows {
        match decode(row) {
            Ok((key, value)) => collection.set(key, value, true)?,
            Err(e) => warn!(table, error = %e, "Skipping malformed row"),
        }
    }
    Ok(collection)
}

fn validate_filters(filters: &Filters) -> Result<()> {
    match filters
        .keys()
        .find(|key| !FILTER_COLUMNS.contains(&key.as_str()))
    {
        Some(key) => Err(Error::InvalidFilter(key.clone())),
        None => Ok(()),
    }
}

fn describe(filters: &Filters) -> String {
    filters
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn query_workload_rows(conn: &Connection, filters: &Filters) -> Result<Vec<WorkloadRow>> {
    validate_filters(filters)?;

    let mut sql = format!("SELECT {WORKLOAD_COLUMNS} FROM workloads");
    if !filters.is_empty() {
        let clauses: Vec<String> = filters
            .keys()
            .enumerate()
            .map(|(i, column)| format!("{column} = ?{}", i + 1))
            .collect();
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY key");

    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params_from_iter(filters.values()), WorkloadRow::read)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

impl Store {
    pub fn get_all_namespaces(&self) -> Result<Collection<Namespace>> {
        let rows = {
            let conn = self.lock();
            let mut stmt = conn.prepare_cached(
                "SELECT key, name, status, labels, annotations, creation_timestamp
                 FROM namespaces",
            )?;
            let rows = stmt.query_map([], NamespaceRow::read)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        collect_decoded(rows, "namespaces", NamespaceRow::decode)
    }

    /// Single namespace by name; [`Error::NotFound`] when absent.
    pub fn get_namespace(&self, name: &str) -> Result<Namespace> {
        let row = {
            let conn = self.lock();
            let mut stmt = conn.prepare_cached(
                "SELECT key, name, status, labels, annotations, creation_timestamp
                 FROM namespaces WHERE name = ?1",
            )?;
            stmt.query_row(params![name], NamespaceRow::read)
                .optional()?
        };

        match row {
            Some(row) => Ok(row.decode()?.1),
            None => Err(Error::not_found("namespace", name)),
        }
    }

    pub fn get_all_nodes(&self) -> Result<Collection<Node>> {
        let rows = {
            let conn = self.lock();
            let mut stmt = conn.prepare_cached(
                "SELECT key, name, cpu, memory, os_image, kubelet_version, labels, annotations,
                        creation_timestamp, status, roles
                 FROM nodes",
            )?;
            let rows = stmt.query_map([], NodeRow::read)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        collect_decoded(rows, "nodes", NodeRow::decode)
    }

    pub fn get_all_workloads(&self) -> Result<Collection<Workload>> {
        self.get_workloads_by(&Filters::new())
    }

    /// Workloads whose columns equal every filter value. Only `namespace`,
    /// `workload_name` and `workload_type` may be used as filter keys.
    pub fn get_workloads_by(&self, filters: &Filters) -> Result<Collection<Workload>> {
        let rows = query_workload_rows(&self.lock(), filters)?;
        collect_decoded(rows, "workloads", WorkloadRow::decode)
    }

    /// First workload matching `filters`; [`Error::NotFound`] when none does.
    pub fn get_workload_by(&self, filters: &Filters) -> Result<Workload> {
        let rows = query_workload_rows(&self.lock(), filters)?;
        match rows.into_iter().next() {
            Some(row) => Ok(row.decode()?.1),
            None => Err(Error::not_found("workload", describe(filters))),
        }
    }

    pub fn get_workloads_by_namespace(&self, namespace: &str) -> Result<Collection<Workload>> {
        let filters = Filters::from([("namespace".to_string(), namespace.to_string())]);
        self.get_workloads_by(&filters)
    }

    pub fn get_all_by_workload_type(&self, kind: WorkloadKind) -> Result<Collection<Workload>> {
        let filters = Filters::from([("workload_type".to_string(), kind.as_str().to_string())]);
        self.get_workloads_by(&filters)
    }

    /// Pods in the workload's namespace carrying every selector label.
    pub fn get_pods_for_workload(&self, workload: &Workload) -> Result<Collection<Workload>> {
        let filters = Filters::from([
            ("namespace".to_string(), workload.namespace().to_string()),
            (
                "workload_type".to_string(),
                WorkloadKind::Pod.as_str().to_string(),
            ),
        ]);
        let pods = self.get_workloads_by(&filters)?;
        Ok(pods.filter(|pod| selector_matches(workload.selector(), pod.labels())))
    }

    /// Every stored sample, keyed `{key}_{unix_seconds}`.
    pub fn get_all_metrics(&self) -> Result<Collection<ContainerMetric>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {METRIC_COLUMNS} FROM container_metrics ORDER BY creation_timestamp"
        ))?;
        let rows = stmt.query_map([], read_metric)?;
        rows_to_metrics(rows)
    }

    /// Every stored sample of one namespace.
    pub fn get_metrics_by_namespace(&self, namespace: &str) -> Result<Collection<ContainerMetric>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {METRIC_COLUMNS} FROM container_metrics
             WHERE namespace = ?1
             ORDER BY creation_timestamp"
        ))?;
        let rows = stmt.query_map(params![namespace], read_metric)?;
        rows_to_metrics(rows)
    }

    /// Samples for the named pods of one namespace.
    pub fn get_metrics_for_pods(
        &self,
        namespace: &str,
        pod_names: &[String],
    ) -> Result<Collection<ContainerMetric>> {
        if pod_names.is_empty() {
            return Ok(Collection::new());
        }

        let placeholders: Vec<String> = (0..pod_names.len())
            .map(|i| format!("?{}", i + 2))
            .collect();
        let sql = format!(
            "SELECT {METRIC_COLUMNS} FROM container_metrics
             WHERE namespace = ?1 AND pod_name IN ({})
             ORDER BY creation_timestamp",
            placeholders.join(", ")
        );

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let values = std::iter::once(namespace).chain(pod_names.iter().map(String::as_str));
        let rows = stmt.query_map(params_from_iter(values), read_metric)?;
        rows_to_metrics(rows)
    }
}

fn rows_to_metrics(
    rows: impl Iterator<Item = rusqlite::Result<ContainerMetric>>,
) -> Result<Collection<ContainerMetric>> {
    let collection = Collection::new();
    for row in rows {
        let metric = row?;
        collection.set(metric.sample_key(), metric, true)?;
    }
    Ok(collection)
}
