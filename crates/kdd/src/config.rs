//! Daemon configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Port for the REST API, health and metrics
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Seconds between sync cycles
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Explicit kubeconfig; in-cluster or `KUBECONFIG` inference when unset
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Label attached to structured log records
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,
}

fn default_http_port() -> u16 {
    8080
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data.sqlite")
}

fn default_sync_interval() -> u64 {
    10
}

fn default_cluster_name() -> String {
    "default".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            database_path: default_database_path(),
            sync_interval_secs: default_sync_interval(),
            kubeconfig: None,
            cluster_name: default_cluster_name(),
        }
    }
}

impl AppConfig {
    /// Load from the optional file named by `KDD_CONFIG`, then `KDD_*`
    /// environment variables, which take precedence.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var("KDD_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path));
        }
        builder = builder.add_source(config::Environment::with_prefix("KDD"));

        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let config = builder.build().context("failed to read configuration")?;
        let parsed: AppConfig = config
            .try_deserialize()
            .context("invalid configuration")?;

        anyhow::ensure!(
            parsed.sync_interval_secs > 0,
            "sync_interval_secs must be greater than zero"
        );
        Ok(parsed)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}
