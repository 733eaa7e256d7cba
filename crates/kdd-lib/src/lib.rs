//! Core library for the Kubernetes workload dashboard
//!
//! This crate provides:
//! - Cluster collection behind the `ResourceProvider` trait
//! - A SQLite snapshot store with replace-and-prune reconciliation
//! - The periodic sync controller
//! - Peak-preserving metric downsampling
//! - The REST API, health checks and observability

pub mod api;
pub mod collector;
pub mod controller;
pub mod downsample;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod store;

pub use collector::{KubeProvider, ResourceProvider, WorkloadCollector};
pub use controller::{Controller, ControllerConfig, ControllerState, SyncReport};
pub use error::{Error, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{DashboardMetrics, StructuredLogger};
pub use store::Store;
