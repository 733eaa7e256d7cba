//! SQLite persistence for collected snapshots
//!
//! Each category lives in its own table keyed by the collection key. Writes
//! follow replace-and-prune: every key of the fresh collection is upserted
//! and every stored key absent from it is deleted, inside one transaction.
//! Container metrics are additive and bounded by time-based retention.

mod queries;


pub use queries::Filters;

use crate::error::{Error, Result};
use crate::models::{Collection, ContainerMetric, Namespace, Node, Workload};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use rusqlite::{params, Connection, Transaction};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Metric samples older than this are purged after every metrics update.
pub const METRICS_RETENTION_DAYS: i64 = 7;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS namespaces (
    key                TEXT PRIMARY KEY,
    name               TEXT NOT NULL,
    status             TEXT NOT NULL,
    labels             TEXT NOT NULL,
    annotations        TEXT NOT NULL,
    creation_timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS nodes (
    key                TEXT PRIMARY KEY,
    name               TEXT NOT NULL,
    cpu                INTEGER NOT NULL,
    memory             INTEGER NOT NULL,
    os_image           TEXT NOT NULL,
    kubelet_version    TEXT NOT NULL,
    labels             TEXT NOT NULL,
    annotations        TEXT NOT NULL,
    creation_timestamp INTEGER NOT NULL,
    status             TEXT NOT NULL,
    roles              TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS workloads (
    key                TEXT PRIMARY KEY,
    workload_name      TEXT NOT NULL,
    workload_type      TEXT NOT NULL,
    namespace          TEXT NOT NULL,
    labels             TEXT NOT NULL,
    annotations        TEXT NOT NULL,
    selector           TEXT NOT NULL,
    containers         TEXT NOT NULL,
    status             TEXT NOT NULL,
    restarts           INTEGER NOT NULL DEFAULT 0,
    creation_timestamp INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_workloads_namespace ON workloads(namespace);
CREATE INDEX IF NOT EXISTS idx_workloads_type ON workloads(workload_type);
CREATE INDEX IF NOT EXISTS idx_workloads_name ON workloads(workload_name);

CREATE TABLE IF NOT EXISTS container_metrics (
    key                TEXT NOT NULL,
    pod_name           TEXT NOT NULL,
    namespace          TEXT NOT NULL,
    container_name     TEXT NOT NULL,
    cpu_usage          INTEGER NOT NULL,
    memory_usage       INTEGER NOT NULL,
    creation_timestamp INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_container_metrics_key_ts
    ON container_metrics(key, creation_timestamp);
CREATE INDEX IF NOT EXISTS idx_container_metrics_pod
    ON container_metrics(namespace, pod_name);
CREATE INDEX IF NOT EXISTS idx_container_metrics_ts
    ON container_metrics(creation_timestamp);
";

/// Rows written and removed by one metrics update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsUpdate {
    pub upserted: usize,
    pub pruned: usize,
}

/// Durable store over a single SQLite connection.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        info!(path = %path.display(), "Opened snapshot database");
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the namespaces table match `collection` exactly.
    pub fn replace_namespaces(&self, collection: &Collection<Namespace>) -> Result<usize> {
        let entries = collection.entries();
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO namespaces
                 (key, name, status, labels, annotations, creation_timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (key, ns) in &entries {
                stmt.execute(params![
                    key,
                    ns.name,
                    ns.status,
                    to_json("labels", &ns.labels)?,
                    to_json("annotations", &ns.annotations)?,
                    ns.creation_timestamp.timestamp(),
                ])?;
            }
        }
        let pruned = prune_absent(&tx, "namespaces", &entries)?;
        tx.commit()?;

        debug!(upserted = entries.len(), pruned, "Replaced namespaces");
        Ok(entries.len())
    }

    /// Make the nodes table match `collection` exactly.
    pub fn replace_nodes(&self, collection: &Collection<Node>) -> Result<usize> {
        let entries = collection.entries();
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO nodes
                 (key, name, cpu, memory, os_image, kubelet_version, labels, annotations,
                  creation_timestamp, status, roles)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for (key, node) in &entries {
                stmt.execute(params![
                    key,
                    node.name,
                    node.cpu,
                    node.memory,
                    node.os_image,
                    node.kubelet_version,
                    to_json("labels", &node.labels)?,
                    to_json("annotations", &node.annotations)?,
                    node.creation_timestamp.timestamp(),
                    node.status,
                    node.roles,
                ])?;
            }
        }
        let pruned = prune_absent(&tx, "nodes", &entries)?;
        tx.commit()?;

        debug!(upserted = entries.len(), pruned, "Replaced nodes");
        Ok(entries.len())
    }

    /// Make the workloads table match `collection` exactly.
    pub fn replace_workloads(&self, collection: &Collection<Workload>) -> Result<usize> {
        let entries = collection.entries();
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO workloads
                 (key, workload_name, workload_type, namespace, labels, annotations, selector,
                  containers, status, restarts, creation_timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for (key, workload) in &entries {
                let status = workload
                    .status()
                    .to_json()
                    .map_err(|source| Error::Serialization {
                        field: "status",
                        source,
                    })?;
                stmt.execute(params![
                    key,
                    workload.name(),
                    workload.kind().as_str(),
                    workload.namespace(),
                    to_json("labels", workload.labels())?,
                    to_json("annotations", workload.annotations())?,
                    to_json("selector", workload.selector())?,
                    to_json("containers", workload.containers())?,
                    status,
                    workload.restarts(),
                    workload.creation_timestamp().timestamp(),
                ])?;
            }
        }
        let pruned = prune_absent(&tx, "workloads", &entries)?;
        tx.commit()?;

        debug!(upserted = entries.len(), pruned, "Replaced workloads");
        Ok(entries.len())
    }

    /// Upsert every sample, then purge samples past the retention window.
    ///
    /// Rows are keyed by [`ContainerMetric::key`] and timestamp whatever key
    /// the collection uses, so one batch may carry several samples per
    /// container.
    pub fn update_metrics(&self, collection: &Collection<ContainerMetric>) -> Result<MetricsUpdate> {
        let samples = collection.to_list();
        {
            let mut conn = self.lock();
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO container_metrics
                     (key, pod_name, namespace, container_name, cpu_usage, memory_usage,
                      creation_timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for metric in &samples {
                    stmt.execute(params![
                        metric.key(),
                        metric.pod_name,
                        metric.namespace,
                        metric.container_name,
                        metric.cpu_usage,
                        metric.memory_usage,
                        metric.timestamp.timestamp(),
                    ])?;
                }
            }
            tx.commit()?;
        }

        let cutoff = Utc::now() - ChronoDuration::days(METRICS_RETENTION_DAYS);
        let pruned = self.prune_metrics_before(cutoff)?;

        Ok(MetricsUpdate {
            upserted: samples.len(),
            pruned,
        })
    }

    /// Delete every metric sample taken strictly before `cutoff`.
    pub fn prune_metrics_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock();
        let pruned = conn.execute(
            "DELETE FROM container_metrics WHERE creation_timestamp < ?1",
            params![cutoff.timestamp()],
        )?;
        if pruned > 0 {
            debug!(pruned, cutoff = %cutoff, "Pruned expired metric samples");
        }
        Ok(pruned)
    }
}

/// Delete rows whose key is not among `entries`. Returns the number removed.
fn prune_absent<T>(tx: &Transaction<'_>, table: &str, entries: &[(String, T)]) -> Result<usize> {
    let keep: HashSet<&str> = entries.iter().map(|(key, _)| key.as_str()).collect();

    let stored: Vec<String> = {
        let mut stmt = tx.prepare_cached(&format!("SELECT key FROM {table}"))?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut delete = tx.prepare_cached(&format!("DELETE FROM {table} WHERE key = ?1"))?;
    let mut removed = 0;
    for key in stored.iter().filter(|key| !keep.contains(key.as_str())) {
        removed += delete.execute(params![key])?;
    }
    Ok(removed)
}

fn to_json<T: Serialize + ?Sized>(field: &'static str, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|source| Error::Serialization { field, source })
}

fn from_unix(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().unwrap_or_default()
}
