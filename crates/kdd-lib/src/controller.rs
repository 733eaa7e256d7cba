//! Sync loop driving the collector and the store
//!
//! Runs one cycle immediately, then one per interval until a shutdown
//! signal arrives. Each cycle collects a fresh snapshot and reconciles it
//! category by category. A failed cycle is logged and recorded in health
//! and metrics; the loop carries on with the next tick.

use crate::collector::WorkloadCollector;
use crate::error::{Error, Result};
use crate::health::{components, HealthRegistry};
use crate::observability::{DashboardMetrics, StructuredLogger};
use crate::store::Store;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Lifecycle of a [`Controller`]. A controller runs at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Time between sync cycles (default: 10 seconds)
    pub sync_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(10),
        }
    }
}

/// Outcome of one successful sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub namespaces: usize,
    pub nodes: usize,
    pub workloads: usize,
    pub samples: usize,
    pub pruned_samples: usize,
    pub metrics_available: bool,
    pub elapsed: Duration,
}

pub struct Controller {
    collector: Arc<WorkloadCollector>,
    store: Arc<Store>,
    config: ControllerConfig,
    state: Mutex<ControllerState>,
    health: HealthRegistry,
    metrics: DashboardMetrics,
    logger: StructuredLogger,
}

impl Controller {
    pub fn builder(collector: Arc<WorkloadCollector>, store: Arc<Store>) -> ControllerBuilder {
        ControllerBuilder::new(collector, store)
    }

    pub fn state(&self) -> ControllerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, from: ControllerState, to: ControllerState) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != from {
            return Err(Error::AlreadyStarted);
        }
        *state = to;
        Ok(())
    }

    /// Run until `shutdown` fires (or its sender is dropped).
    ///
    /// Fails with [`Error::AlreadyStarted`] unless the controller is idle.
    /// A cycle in progress always completes before shutdown is observed.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        self.transition(ControllerState::Idle, ControllerState::Running)?;
        self.health.register(components::CONTROLLER).await;
        self.health.set_ready(true).await;

        info!(
            interval_secs = self.config.sync_interval.as_secs(),
            "Starting sync loop"
        );

        // The first tick completes immediately, giving the startup cycle.
        let mut ticker = interval(self.config.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down sync loop");
                    break;
                }
            }
        }

        self.transition(ControllerState::Running, ControllerState::Stopped)?;
        self.health.set_ready(false).await;
        self.health
            .set_degraded(components::CONTROLLER, "sync loop stopped")
            .await;
        Ok(())
    }

    async fn tick(&self) {
        match self.sync_once().await {
            Ok(report) => {
                self.metrics.observe_sync_latency(report.elapsed);
                self.metrics.set_tracked("namespaces", report.namespaces);
                self.metrics.set_tracked("nodes", report.nodes);
                self.metrics.set_tracked("workloads", report.workloads);
                self.metrics
                    .add_samples(report.samples, report.pruned_samples);
                self.logger.log_sync(&report);

                if report.metrics_available {
                    self.health.set_healthy(components::COLLECTOR).await;
                } else {
                    self.health
                        .set_degraded(components::COLLECTOR, "metrics API unavailable")
                        .await;
                }
                self.health.set_healthy(components::STORE).await;
                self.health.set_healthy(components::CONTROLLER).await;
            }
            Err(e) => {
                self.metrics.inc_sync_errors();
                self.logger.log_sync_failure(&e);

                match &e {
                    Error::ProviderFetch { .. } => {
                        self.health
                            .set_degraded(components::COLLECTOR, e.to_string())
                            .await;
                    }
                    Error::Storage(_) | Error::Serialization { .. } => {
                        self.health
                            .set_unhealthy(components::STORE, e.to_string())
                            .await;
                    }
                    _ => {
                        self.health
                            .set_degraded(components::CONTROLLER, e.to_string())
                            .await;
                    }
                }
            }
        }
    }

    /// Run one collect and reconcile cycle.
    ///
    /// Categories are replaced in order: namespaces, nodes, workloads, then
    /// metrics. Nothing is written when collection fails.
    pub async fn sync_once(&self) -> Result<SyncReport> {
        let start = Instant::now();
        let snapshot = self.collector.collect().await?;
        let metrics_available = snapshot.metrics_available;

        let store = Arc::clone(&self.store);
        let (namespaces, nodes, workloads, update) = tokio::task::spawn_blocking(move || {
            let namespaces = store.replace_namespaces(&snapshot.namespaces)?;
            let nodes = store.replace_nodes(&snapshot.nodes)?;
            let workloads = store.replace_workloads(&snapshot.workloads)?;
            let update = store.update_metrics(&snapshot.metrics)?;
            Ok::<_, Error>((namespaces, nodes, workloads, update))
        })
        .await??;

        let report = SyncReport {
            namespaces,
            nodes,
            workloads,
            samples: update.upserted,
            pruned_samples: update.pruned,
            metrics_available,
            elapsed: start.elapsed(),
        };
        debug!(?report, "Sync cycle complete");
        Ok(report)
    }
}

/// Builder for [`Controller`]
pub struct ControllerBuilder {
    collector: Arc<WorkloadCollector>,
    store: Arc<Store>,
    config: ControllerConfig,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl ControllerBuilder {
    pub fn new(collector: Arc<WorkloadCollector>, store: Arc<Store>) -> Self {
        Self {
            collector,
            store,
            config: ControllerConfig::default(),
            health: None,
            logger: None,
        }
    }

    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.config.sync_interval = interval;
        self
    }

    /// Share a health registry with the API
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Controller {
        Controller {
            collector: self.collector,
            store: self.store,
            config: self.config,
            state: Mutex::new(ControllerState::Idle),
            health: self.health.unwrap_or_default(),
            metrics: DashboardMetrics::new(),
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("default")),
        }
    }
}
