//! REST API over the snapshot store
//!
//! All `/api/v1` responses share one envelope:
//! `{ "code": <int>, "msg": <string>, "data": <payload> }`.
//! Health and Prometheus endpoints are served unwrapped at the root.

use crate::collector::WorkloadCollector;
use crate::downsample::{reduce_metrics, sort_by_timestamp};
use crate::error::Error;
use crate::health::{ComponentStatus, HealthRegistry};
use crate::models::{ContainerMetric, Event, Namespace, Node, Workload, WorkloadKind};
use crate::observability::DashboardMetrics;
use crate::store::{Filters, Store};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Downsampling window used when `?rate=` is absent
pub const DEFAULT_RATE: &str = "5m";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub collector: Arc<WorkloadCollector>,
    pub health_registry: HealthRegistry,
    pub metrics: DashboardMetrics,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        collector: Arc<WorkloadCollector>,
        health_registry: HealthRegistry,
        metrics: DashboardMetrics,
    ) -> Self {
        Self {
            store,
            collector,
            health_registry,
            metrics,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub msg: String,
    pub data: T,
}

fn message_for(status: StatusCode) -> &'static str {
    match status {
        StatusCode::OK => "ok",
        StatusCode::BAD_REQUEST => "invalid parameters provided",
        StatusCode::NOT_FOUND => "resource could not be found",
        StatusCode::BAD_GATEWAY => "cluster request failed",
        _ => "fail",
    }
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        code: StatusCode::OK.as_u16(),
        msg: message_for(StatusCode::OK).to_string(),
        data,
    })
}

/// Error half of a handler result, rendered into the envelope
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Lib(Error),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Lib(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Lib(err) => match err {
                Error::InvalidFilter(_) | Error::UnknownWorkloadType(_) => StatusCode::BAD_REQUEST,
                Error::NotFound { .. } => StatusCode::NOT_FOUND,
                Error::ProviderFetch { .. } => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Lib(err) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!(error = %err, "Request failed");
                "an internal server error occurred".to_string()
            }
            ApiError::Lib(err) => err.to_string(),
        };

        let body = Envelope {
            code: status.as_u16(),
            msg: message_for(status).to_string(),
            data: detail,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<Envelope<T>>, ApiError>;

/// Run a store query on the blocking pool.
async fn blocking<T, F>(store: &Arc<Store>, query: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Store) -> crate::error::Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    let result = tokio::task::spawn_blocking(move || query(&store))
        .await
        .map_err(Error::from)?;
    Ok(result?)
}

fn parse_kind(plural: &str) -> Result<WorkloadKind, ApiError> {
    WorkloadKind::from_plural(plural)
        .ok_or_else(|| ApiError::Lib(Error::UnknownWorkloadType(plural.to_string())))
}

fn parse_rate(rate: Option<&str>) -> Result<Duration, ApiError> {
    let raw = rate.unwrap_or(DEFAULT_RATE);
    humantime::parse_duration(raw)
        .map_err(|e| ApiError::BadRequest(format!("invalid rate {raw:?}: {e}")))
}

/// Sort ascending, then keep one peak sample per `rate` window.
fn downsample(mut samples: Vec<ContainerMetric>, rate: Duration) -> Vec<ContainerMetric> {
    sort_by_timestamp(&mut samples);
    reduce_metrics(&samples, rate)
}

fn sort_workloads(workloads: &mut [Workload]) {
    workloads.sort_by(|a, b| {
        a.name()
            .cmp(b.name())
            .then_with(|| a.namespace().cmp(b.namespace()))
    });
}

async fn list_nodes(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Node>> {
    let mut nodes = blocking(&state.store, |s| s.get_all_nodes()).await?.to_list();
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ok(nodes))
}

async fn list_namespaces(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Namespace>> {
    let mut namespaces = blocking(&state.store, |s| s.get_all_namespaces())
        .await?
        .to_list();
    namespaces.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ok(namespaces))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NamespaceDetail {
    pub namespace: Namespace,
    pub workloads: Vec<Workload>,
    pub events: Vec<Event>,
}

async fn get_namespace(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<NamespaceDetail> {
    let (namespace, workloads) = {
        let name = name.clone();
        blocking(&state.store, move |s| {
            let namespace = s.get_namespace(&name)?;
            let workloads = s.get_workloads_by_namespace(&name)?;
            Ok((namespace, workloads))
        })
        .await?
    };

    let mut workloads = workloads.to_list();
    sort_workloads(&mut workloads);

    // Events are not persisted; they come straight from the cluster.
    let mut events = state.collector.events_for_namespace(&name).await?.to_list();
    events.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));

    Ok(ok(NamespaceDetail {
        namespace,
        workloads,
        events,
    }))
}

async fn list_workloads(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Workload>> {
    let mut workloads = blocking(&state.store, |s| s.get_all_workloads())
        .await?
        .to_list();
    sort_workloads(&mut workloads);
    Ok(ok(workloads))
}

#[derive(Debug, Default, Deserialize)]
pub struct WorkloadQuery {
    pub namespace: Option<String>,
    pub name: Option<String>,
}

async fn list_workloads_of_kind(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<WorkloadQuery>,
) -> ApiResult<Vec<Workload>> {
    let kind = parse_kind(&kind)?;

    let mut filters = Filters::from([("workload_type".to_string(), kind.as_str().to_string())]);
    if let Some(namespace) = query.namespace.filter(|ns| !ns.is_empty()) {
        filters.insert("namespace".to_string(), namespace);
    }
    if let Some(name) = query.name.filter(|n| !n.is_empty()) {
        filters.insert("workload_name".to_string(), name);
    }

    let mut workloads = blocking(&state.store, move |s| s.get_workloads_by(&filters))
        .await?
        .to_list();
    sort_workloads(&mut workloads);
    Ok(ok(workloads))
}

#[derive(Debug, Default, Deserialize)]
pub struct RateQuery {
    pub rate: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkloadDetail {
    pub workload: Workload,
    pub pods: Vec<Workload>,
    pub metrics: Vec<ContainerMetric>,
}

async fn get_workload(
    State(state): State<Arc<AppState>>,
    Path((kind, namespace, name)): Path<(String, String, String)>,
    Query(query): Query<RateQuery>,
) -> ApiResult<WorkloadDetail> {
    let kind = parse_kind(&kind)?;
    let rate = parse_rate(query.rate.as_deref())?;

    let filters = Filters::from([
        ("workload_type".to_string(), kind.as_str().to_string()),
        ("namespace".to_string(), namespace),
        ("workload_name".to_string(), name),
    ]);

    let (workload, mut pods, samples) = blocking(&state.store, move |s| {
        let workload = s.get_workload_by(&filters)?;
        let pods = match workload.kind() {
            WorkloadKind::Pod => vec![workload.clone()],
            _ => s.get_pods_for_workload(&workload)?.to_list(),
        };
        let pod_names: Vec<String> = pods.iter().map(|p| p.name().to_string()).collect();
        let samples = s.get_metrics_for_pods(workload.namespace(), &pod_names)?;
        Ok((workload, pods, samples.to_list()))
    })
    .await?;

    sort_workloads(&mut pods);

    Ok(ok(WorkloadDetail {
        workload,
        pods,
        metrics: downsample(samples, rate),
    }))
}

async fn list_container_metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RateQuery>,
) -> ApiResult<Vec<ContainerMetric>> {
    let rate = parse_rate(query.rate.as_deref())?;

    let samples = match query.namespace.filter(|ns| !ns.is_empty()) {
        Some(namespace) => {
            blocking(&state.store, move |s| s.get_metrics_by_namespace(&namespace)).await?
        }
        None => blocking(&state.store, |s| s.get_all_metrics()).await?,
    }
    .to_list();

    Ok(ok(downsample(samples, rate)))
}

/// Returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .route("/nodes", get(list_nodes))
        .route("/namespaces", get(list_namespaces))
        .route("/namespaces/:name", get(get_namespace))
        .route("/workloads", get(list_workloads))
        .route("/workloads/:kind", get(list_workloads_of_kind))
        .route("/workloads/:kind/:namespace/:name", get(get_workload))
        .route("/container-metrics", get(list_container_metrics));

    Router::new()
        .nest("/api/v1", v1)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves.
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
