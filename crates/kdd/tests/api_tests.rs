//! Integration tests for the dashboard API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, DurationRound, Utc};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Event, Namespace, Node, ObjectReference, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kdd_lib::{
    api::{create_router, AppState},
    collector::{async_trait, PodMetrics, ResourceProvider},
    health::{components, HealthRegistry},
    models, Collection, ContainerMetric, DashboardMetrics, DeploymentStatus, GeneralInfo, Labels,
    PodStatus, Store, Workload, WorkloadCollector, WorkloadStatus,
};
use std::sync::Arc;
use tower::ServiceExt;

/// Serves events only; everything else comes from the pre-filled store.
struct EventsProvider;

#[async_trait]
impl ResourceProvider for EventsProvider {
    async fn list_namespaces(&self) -> kdd_lib::Result<Vec<Namespace>> {
        Ok(vec![])
    }

    async fn list_nodes(&self) -> kdd_lib::Result<Vec<Node>> {
        Ok(vec![])
    }

    async fn list_deployments(&self) -> kdd_lib::Result<Vec<Deployment>> {
        Ok(vec![])
    }

    async fn list_daemonsets(&self) -> kdd_lib::Result<Vec<DaemonSet>> {
        Ok(vec![])
    }

    async fn list_statefulsets(&self) -> kdd_lib::Result<Vec<StatefulSet>> {
        Ok(vec![])
    }

    async fn list_pods(&self) -> kdd_lib::Result<Vec<Pod>> {
        Ok(vec![])
    }

    async fn list_jobs(&self) -> kdd_lib::Result<Vec<Job>> {
        Ok(vec![])
    }

    async fn list_cronjobs(&self) -> kdd_lib::Result<Vec<CronJob>> {
        Ok(vec![])
    }

    async fn list_pod_metrics(&self) -> kdd_lib::Result<Vec<PodMetrics>> {
        Ok(vec![])
    }

    async fn list_events(&self, namespace: &str) -> kdd_lib::Result<Vec<Event>> {
        if namespace == "legacy" {
            return Err(kdd_lib::Error::ProviderFetch {
                resource: "events",
                message: "forbidden".to_string(),
            });
        }

        Ok(vec![Event {
            metadata: ObjectMeta {
                name: Some("web.17a".to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            involved_object: ObjectReference {
                kind: Some("Pod".to_string()),
                name: Some("web-1".to_string()),
                ..Default::default()
            },
            reason: Some("Pulled".to_string()),
            type_: Some("Normal".to_string()),
            count: Some(1),
            ..Default::default()
        }])
    }
}

fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn info(name: &str, namespace: &str, labels: Labels, selector: Labels) -> GeneralInfo {
    GeneralInfo {
        name: name.to_string(),
        namespace: namespace.to_string(),
        labels,
        annotations: Labels::new(),
        selector,
        containers: vec![],
        creation_timestamp: Utc::now(),
    }
}

fn pod(name: &str, namespace: &str, app: &str) -> Workload {
    Workload::new(
        info(name, namespace, labels(&[("app", app)]), Labels::new()),
        WorkloadStatus::Pod(PodStatus {
            phase: "Running".to_string(),
            ..Default::default()
        }),
    )
}

fn sample(pod: &str, at: DateTime<Utc>, cpu: i64) -> ContainerMetric {
    ContainerMetric {
        pod_name: pod.to_string(),
        namespace: "shop".to_string(),
        container_name: "app".to_string(),
        cpu_usage: cpu,
        memory_usage: 64,
        timestamp: at,
    }
}

fn seed(store: &Store) {
    let namespaces: Collection<models::Namespace> = ["shop", "kube-system", "legacy"]
        .into_iter()
        .map(|name| {
            let ns = models::Namespace {
                name: name.to_string(),
                status: "Active".to_string(),
                labels: Labels::new(),
                annotations: Labels::new(),
                creation_timestamp: Utc::now(),
            };
            (ns.key(), ns)
        })
        .collect();
    store.replace_namespaces(&namespaces).unwrap();

    let web = Workload::new(
        info("web", "shop", Labels::new(), labels(&[("app", "web")])),
        WorkloadStatus::Deployment(DeploymentStatus {
            desired: 2,
            ready: 2,
            available: 2,
            up_to_date: 2,
        }),
    );
    let workloads: Collection<Workload> = [
        web,
        pod("web-1", "shop", "web"),
        pod("web-2", "shop", "web"),
        pod("db-0", "shop", "db"),
        pod("coredns-1", "kube-system", "dns"),
    ]
    .into_iter()
    .map(|w| (w.key(), w))
    .collect();
    store.replace_workloads(&workloads).unwrap();

    // Two samples per pod inside one window, a third well after it.
    let base = (Utc::now() - Duration::hours(1))
        .duration_trunc(Duration::seconds(1))
        .unwrap();
    let samples: Collection<ContainerMetric> = [
        sample("web-1", base, 10),
        sample("web-1", base + Duration::minutes(1), 30),
        sample("web-1", base + Duration::minutes(20), 5),
        sample("db-0", base, 100),
    ]
    .into_iter()
    .map(|s| (s.sample_key(), s))
    .collect();
    store.update_metrics(&samples).unwrap();
}

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    seed(&store);

    let health_registry = HealthRegistry::new();
    health_registry.register(components::COLLECTOR).await;
    health_registry.register(components::STORE).await;

    let state = Arc::new(AppState::new(
        store,
        Arc::new(WorkloadCollector::new(Arc::new(EventsProvider))),
        health_registry,
        DashboardMetrics::new(),
    ));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn names(list: &serde_json::Value, field: &str) -> Vec<String> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|item| item[field].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_namespaces_sorted_in_envelope() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/api/v1/namespaces").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 200);
    assert_eq!(body["msg"], "ok");
    assert_eq!(
        names(&body["data"], "name"),
        vec!["kube-system", "legacy", "shop"]
    );
}

#[tokio::test]
async fn test_empty_nodes_is_empty_list() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/api/v1/nodes").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], serde_json::json!([]));
}

#[tokio::test]
async fn test_namespace_detail_includes_workloads_and_events() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/api/v1/namespaces/shop").await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["namespace"]["name"], "shop");
    assert_eq!(data["workloads"].as_array().unwrap().len(), 4);
    assert_eq!(data["events"][0]["reason"], "Pulled");
    assert_eq!(data["events"][0]["object"], "Pod/web-1");
}

#[tokio::test]
async fn test_unknown_namespace_is_404() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/api/v1/namespaces/nope").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
    assert_eq!(body["msg"], "resource could not be found");
}

#[tokio::test]
async fn test_event_fetch_failure_is_502() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/api/v1/namespaces/legacy").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], 502);
}

#[tokio::test]
async fn test_workloads_sorted_by_name() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/api/v1/workloads").await;

    assert_eq!(status, StatusCode::OK);
    let workload_names: Vec<String> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["workload_info"]["workload_name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        workload_names,
        vec!["coredns-1", "db-0", "web", "web-1", "web-2"]
    );
}

#[tokio::test]
async fn test_workloads_of_kind_with_namespace_filter() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/api/v1/workloads/pods?namespace=kube-system").await;

    assert_eq!(status, StatusCode::OK);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["type"], "Pod");
    assert_eq!(data[0]["workload_info"]["workload_name"], "coredns-1");
}

#[tokio::test]
async fn test_unknown_kind_is_400() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/api/v1/workloads/replicasets").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "invalid parameters provided");
}

#[tokio::test]
async fn test_workload_detail_selects_pods_and_downsamples() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/api/v1/workloads/deployments/shop/web?rate=5m").await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["workload"]["status"]["desired"], 2);

    let pods: Vec<String> = data["pods"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["workload_info"]["workload_name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(pods, vec!["web-1", "web-2"]);

    // Peak of the first window, then the late sample; db-0 is not selected.
    let cpu: Vec<i64> = data["metrics"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["cpu_usage"].as_i64().unwrap())
        .collect();
    assert_eq!(cpu, vec![30, 5]);
}

#[tokio::test]
async fn test_pod_detail_uses_the_pod_itself() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/api/v1/workloads/pods/shop/db-0").await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["pods"].as_array().unwrap().len(), 1);
    assert_eq!(data["metrics"][0]["podname"], "db-0");
}

#[tokio::test]
async fn test_missing_workload_is_404() {
    let (app, _state) = setup_test_app().await;

    let (status, _body) = get(app, "/api/v1/workloads/jobs/shop/web").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bad_rate_is_400() {
    let (app, _state) = setup_test_app().await;

    let (status, _body) = get(app, "/api/v1/container-metrics?rate=soon").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_container_metrics_downsampled() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/api/v1/container-metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    // A one second window keeps every distinct sample.
    let (_, body) = get(app, "/api/v1/container-metrics?rate=1s").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_container_metrics_by_namespace() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/api/v1/container-metrics?namespace=shop").await;
    assert_eq!(status, StatusCode::OK);
    let samples = body["data"].as_array().unwrap();
    assert_eq!(samples.len(), 3);
    assert!(samples.iter().all(|s| s["namespace"] == "shop"));

    let (status, body) = get(app, "/api/v1/container-metrics?namespace=kube-system").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_degraded(components::COLLECTOR, "metrics API unavailable")
        .await;

    let (status, health) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::STORE, "database is locked")
        .await;

    let (status, health) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_controller_start() {
    let (app, state) = setup_test_app().await;

    let (status, readiness) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    state.health_registry.set_ready(true).await;

    let (status, readiness) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_serves_prometheus_text() {
    let (app, state) = setup_test_app().await;
    state.metrics.set_tracked("workloads", 5);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("kdd_tracked_objects"));
}
