//! kdd - Kubernetes workload dashboard daemon
//!
//! Periodically snapshots the cluster into SQLite and serves the snapshot
//! over a REST API.

use anyhow::{Context, Result};
use kdd_lib::{
    api::{self, AppState},
    health::{components, HealthRegistry},
    observability::{DashboardMetrics, StructuredLogger},
    Controller, KubeProvider, Store, WorkloadCollector,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const KDD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting kdd");

    let config = config::AppConfig::load()?;
    info!(
        port = config.http_port,
        database = %config.database_path.display(),
        "kdd configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::COLLECTOR).await;
    health_registry.register(components::STORE).await;

    let metrics = DashboardMetrics::new();
    let logger = StructuredLogger::new(&config.cluster_name);
    logger.log_startup(KDD_VERSION, config.sync_interval());

    let store = Arc::new(
        Store::open(&config.database_path)
            .with_context(|| format!("failed to open {}", config.database_path.display()))?,
    );

    let provider = KubeProvider::connect(config.kubeconfig.as_deref())
        .await
        .context("failed to create Kubernetes client")?;
    let collector = Arc::new(WorkloadCollector::new(Arc::new(provider)));

    let controller = Controller::builder(Arc::clone(&collector), Arc::clone(&store))
        .sync_interval(config.sync_interval())
        .health(health_registry.clone())
        .logger(logger.clone())
        .build();

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let controller_handle = tokio::spawn({
        let shutdown = shutdown_tx.subscribe();
        async move { controller.run(shutdown).await }
    });

    let app_state = Arc::new(AppState::new(
        store,
        collector,
        health_registry,
        metrics,
    ));
    let api_handle = tokio::spawn({
        let mut shutdown = shutdown_tx.subscribe();
        api::serve(config.http_port, app_state, async move {
            let _ = shutdown.recv().await;
        })
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    match controller_handle.await {
        Ok(Err(e)) => error!(error = %e, "Controller exited with error"),
        Err(e) => error!(error = %e, "Controller task panicked"),
        Ok(Ok(())) => {}
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server exited with error"),
        Err(e) => error!(error = %e, "API server task panicked"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
