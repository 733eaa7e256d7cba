//! Collector tests against an in-memory resource provider
//!
//! These tests build raw API objects by hand and check the normalized
//! records the collector produces from them.

#[cfg(test)]
mod mock_provider_tests {
    use crate::collector::normalize::{self, split_image};
    use crate::collector::{
        async_trait, ContainerUsage, PodMetrics, PodMetricsContainer, ResourceProvider,
        WorkloadCollector,
    };
    use crate::error::{Error, Result};
    use crate::models::{WorkloadKind, WorkloadStatus};
    use chrono::{TimeZone, Utc};
    use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, DeploymentSpec, StatefulSet};
    use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec};
    use k8s_openapi::api::core::v1::{
        Container, ContainerStatus, Event, EventSource, Namespace, NamespaceStatus, Node,
        NodeCondition, NodeStatus, NodeSystemInfo, ObjectReference, Pod, PodSpec, PodStatus,
        PodTemplateSpec, ResourceRequirements,
    };
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
        LabelSelector, ObjectMeta, OwnerReference, Time,
    };
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct MockProvider {
        namespaces: Vec<Namespace>,
        nodes: Vec<Node>,
        deployments: Vec<Deployment>,
        pods: Vec<Pod>,
        jobs: Vec<Job>,
        cronjobs: Vec<CronJob>,
        pod_metrics: Vec<PodMetrics>,
        events: Vec<Event>,
        fail_pods: bool,
        fail_metrics: bool,
    }

    #[async_trait]
    impl ResourceProvider for MockProvider {
        async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
            Ok(self.namespaces.clone())
        }

        async fn list_nodes(&self) -> Result<Vec<Node>> {
            Ok(self.nodes.clone())
        }

        async fn list_deployments(&self) -> Result<Vec<Deployment>> {
            Ok(self.deployments.clone())
        }

        async fn list_daemonsets(&self) -> Result<Vec<DaemonSet>> {
            Ok(vec![])
        }

        async fn list_statefulsets(&self) -> Result<Vec<StatefulSet>> {
            Ok(vec![])
        }

        async fn list_pods(&self) -> Result<Vec<Pod>> {
            if self.fail_pods {
                return Err(Error::provider("pods", "connection refused"));
            }
            Ok(self.pods.clone())
        }

        async fn list_jobs(&self) -> Result<Vec<Job>> {
            Ok(self.jobs.clone())
        }

        async fn list_cronjobs(&self) -> Result<Vec<CronJob>> {
            Ok(self.cronjobs.clone())
        }

        async fn list_pod_metrics(&self) -> Result<Vec<PodMetrics>> {
            if self.fail_metrics {
                return Err(Error::provider("pod metrics", "the server could not find the requested resource"));
            }
            Ok(self.pod_metrics.clone())
        }

        async fn list_events(&self, namespace: &str) -> Result<Vec<Event>> {
            Ok(self
                .events
                .iter()
                .filter(|e| e.metadata.namespace.as_deref() == Some(namespace))
                .cloned()
                .collect())
        }
    }

    fn meta(namespace: Option<&str>, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(str::to_string),
            creation_timestamp: Some(Time(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap())),
            ..Default::default()
        }
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn quantities(cpu: &str, memory: &str) -> Option<BTreeMap<String, Quantity>> {
        Some(BTreeMap::from([
            ("cpu".to_string(), Quantity(cpu.to_string())),
            ("memory".to_string(), Quantity(memory.to_string())),
        ]))
    }

    fn container(name: &str, image: &str) -> Container {
        Container {
            name: name.to_string(),
            image: Some(image.to_string()),
            resources: Some(ResourceRequirements {
                requests: quantities("250m", "64Mi"),
                limits: quantities("1", "128Mi"),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn pod_spec() -> PodSpec {
        PodSpec {
            containers: vec![container("nginx", "nginx:1.25"), container("sidecar", "envoy")],
            init_containers: Some(vec![container("migrate", "registry:5000/tools/migrate")]),
            ..Default::default()
        }
    }

    fn status(name: &str, restarts: i32) -> ContainerStatus {
        ContainerStatus {
            name: name.to_string(),
            restart_count: restarts,
            ..Default::default()
        }
    }

    fn test_pod(namespace: &str, name: &str) -> Pod {
        let mut metadata = meta(Some(namespace), name);
        metadata.labels = Some(map(&[("app", "web")]));
        metadata.owner_references = Some(vec![OwnerReference {
            api_version: "apps/v1".into(),
            kind: "ReplicaSet".into(),
            name: "web-7d9f".into(),
            uid: "uid-1".into(),
            ..Default::default()
        }]);

        Pod {
            metadata,
            spec: Some(pod_spec()),
            status: Some(PodStatus {
                phase: Some("Running".into()),
                container_statuses: Some(vec![status("nginx", 2), status("sidecar", 5)]),
                ..Default::default()
            }),
        }
    }

    fn test_deployment(namespace: &str, name: &str) -> Deployment {
        Deployment {
            metadata: meta(Some(namespace), name),
            spec: Some(DeploymentSpec {
                replicas: Some(3),
                selector: LabelSelector {
                    match_labels: Some(map(&[("app", "web")])),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(pod_spec()),
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    fn test_node(name: &str) -> Node {
        let mut metadata = meta(None, name);
        metadata.labels = Some(map(&[
            ("node-role.kubernetes.io/worker", ""),
            ("node-role.kubernetes.io/control-plane", ""),
            ("kubernetes.io/hostname", name),
        ]));

        Node {
            metadata,
            spec: None,
            status: Some(NodeStatus {
                capacity: quantities("4", "16318480Ki"),
                conditions: Some(vec![
                    NodeCondition {
                        type_: "MemoryPressure".into(),
                        reason: Some("KubeletHasSufficientMemory".into()),
                        status: "False".into(),
                        ..Default::default()
                    },
                    NodeCondition {
                        type_: "Ready".into(),
                        reason: Some("KubeletReady".into()),
                        status: "True".into(),
                        ..Default::default()
                    },
                ]),
                node_info: Some(NodeSystemInfo {
                    os_image: "Ubuntu 22.04.3 LTS".into(),
                    kubelet_version: "v1.28.2".into(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        }
    }

    fn test_metrics(namespace: &str, pod: &str) -> PodMetrics {
        PodMetrics {
            metadata: meta(Some(namespace), pod),
            timestamp: Some("2024-01-01T10:00:00Z".into()),
            window: Some("15s".into()),
            containers: vec![PodMetricsContainer {
                name: "nginx".into(),
                usage: ContainerUsage {
                    cpu: Some(Quantity("1500000n".into())),
                    memory: Some(Quantity("20Mi".into())),
                },
            }],
        }
    }

    fn populated_provider() -> MockProvider {
        MockProvider {
            namespaces: vec![Namespace {
                metadata: meta(None, "default"),
                status: Some(NamespaceStatus {
                    phase: Some("Active".into()),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            nodes: vec![test_node("node-1")],
            deployments: vec![test_deployment("default", "web")],
            pods: vec![test_pod("default", "web-1"), test_pod("kube-system", "web-1")],
            pod_metrics: vec![test_metrics("default", "web-1")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_collect_populates_every_category() {
        let collector = WorkloadCollector::new(Arc::new(populated_provider()));
        let result = collector.collect().await.unwrap();

        assert_eq!(result.namespaces.len(), 1);
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.workloads.len(), 3);
        assert_eq!(result.metrics.len(), 1);
        assert!(result.metrics_available);

        // Same pod name in two namespaces yields two distinct keys.
        assert!(result.workloads.contains_key("default_web-1"));
        assert!(result.workloads.contains_key("kube-system_web-1"));
        assert!(result.workloads.contains_key("default_web"));
    }

    #[tokio::test]
    async fn test_pod_normalization() {
        let collector = WorkloadCollector::new(Arc::new(populated_provider()));
        let result = collector.collect().await.unwrap();
        let pod = result.workloads.get("default_web-1").unwrap();

        assert_eq!(pod.kind(), WorkloadKind::Pod);
        assert_eq!(pod.restarts(), 5);

        let names: Vec<_> = pod.containers().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["nginx", "sidecar", "migrate"]);

        let nginx = &pod.containers()[0];
        assert_eq!(nginx.image, "nginx");
        assert_eq!(nginx.image_version, "1.25");
        assert_eq!(nginx.restarts, 2);
        assert_eq!(nginx.request_cpu, 250);
        assert_eq!(nginx.limit_cpu, 1000);
        assert_eq!(nginx.request_memory, 64 * 1024 * 1024);
        assert_eq!(nginx.limit_memory, 128 * 1024 * 1024);
        assert!(!nginx.is_init);

        let sidecar = &pod.containers()[1];
        assert_eq!(sidecar.image_version, "latest");
        assert_eq!(sidecar.restarts, 5);

        let init = &pod.containers()[2];
        assert!(init.is_init);
        assert_eq!(init.restarts, 0);
        assert_eq!(init.image, "registry:5000/tools/migrate");

        match pod.status() {
            WorkloadStatus::Pod(status) => {
                assert_eq!(status.phase, "Running");
                assert_eq!(status.owners.len(), 1);
                assert_eq!(status.owners[0].kind, "ReplicaSet");
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_template_containers_have_no_restarts() {
        let collector = WorkloadCollector::new(Arc::new(populated_provider()));
        let result = collector.collect().await.unwrap();
        let deployment = result.workloads.get("default_web").unwrap();

        assert_eq!(deployment.kind(), WorkloadKind::Deployment);
        assert_eq!(deployment.selector().get("app").map(String::as_str), Some("web"));
        assert!(deployment.containers().iter().all(|c| c.restarts == 0));

        match deployment.status() {
            WorkloadStatus::Deployment(status) => {
                assert_eq!(status.desired, 3);
                assert_eq!(status.ready, 0);
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_node_normalization() {
        let collector = WorkloadCollector::new(Arc::new(populated_provider()));
        let result = collector.collect().await.unwrap();
        let node = result.nodes.get("node-1").unwrap();

        assert_eq!(node.status, "KubeletReady");
        assert_eq!(node.roles, "control-plane worker");
        assert_eq!(node.cpu, 4);
        assert_eq!(node.memory, 16711);
        assert_eq!(node.kubelet_version, "v1.28.2");
    }

    #[tokio::test]
    async fn test_metric_samples() {
        let collector = WorkloadCollector::new(Arc::new(populated_provider()));
        let result = collector.collect().await.unwrap();
        let sample = result.metrics.get("default_web-1_nginx").unwrap();

        assert_eq!(sample.cpu_usage, 2);
        assert_eq!(sample.memory_usage, 20 * 1024 * 1024);
        assert_eq!(
            sample.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_metrics_failure_is_not_fatal() {
        let provider = MockProvider {
            fail_metrics: true,
            ..populated_provider()
        };
        let collector = WorkloadCollector::new(Arc::new(provider));
        let result = collector.collect().await.unwrap();

        assert!(!result.metrics_available);
        assert!(result.metrics.is_empty());
        assert_eq!(result.workloads.len(), 3);
    }

    #[tokio::test]
    async fn test_workload_failure_aborts_cycle() {
        let provider = MockProvider {
            fail_pods: true,
            ..populated_provider()
        };
        let collector = WorkloadCollector::new(Arc::new(provider));

        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, Error::ProviderFetch { resource: "pods", .. }));
    }

    #[tokio::test]
    async fn test_jobs_and_cronjobs() {
        let job_spec = JobSpec {
            backoff_limit: Some(6),
            selector: Some(LabelSelector {
                match_labels: Some(map(&[("job-name", "backup")])),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(pod_spec()),
            },
            ..Default::default()
        };
        let provider = MockProvider {
            jobs: vec![Job {
                metadata: meta(Some("ops"), "backup-1"),
                spec: Some(job_spec.clone()),
                status: None,
            }],
            cronjobs: vec![CronJob {
                metadata: meta(Some("ops"), "backup"),
                spec: Some(CronJobSpec {
                    schedule: "0 3 * * *".into(),
                    suspend: Some(false),
                    concurrency_policy: Some("Forbid".into()),
                    job_template: JobTemplateSpec {
                        metadata: None,
                        spec: Some(job_spec),
                    },
                    ..Default::default()
                }),
                status: None,
            }],
            ..Default::default()
        };

        let collector = WorkloadCollector::new(Arc::new(provider));
        let result = collector.collect().await.unwrap();

        assert_eq!(result.workloads.get("ops_backup-1").unwrap().kind(), WorkloadKind::Job);
        let cronjob = result.workloads.get("ops_backup").unwrap();
        assert_eq!(cronjob.selector().get("job-name").map(String::as_str), Some("backup"));
        match cronjob.status() {
            WorkloadStatus::CronJob(status) => {
                assert_eq!(status.schedule, "0 3 * * *");
                assert_eq!(status.concurrency_policy, "Forbid");
                assert_eq!(status.backoff_limit, Some(6));
                assert!(status.active.is_empty());
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_events_for_namespace() {
        let event = |name: &str, reason: &str| Event {
            metadata: meta(Some("default"), name),
            involved_object: ObjectReference {
                kind: Some("Pod".into()),
                name: Some("web-1".into()),
                ..Default::default()
            },
            reason: Some(reason.into()),
            message: Some("Back-off restarting failed container".into()),
            count: Some(4),
            type_: Some("Warning".into()),
            source: Some(EventSource {
                component: Some("kubelet".into()),
                host: Some("node-1".into()),
            }),
            ..Default::default()
        };
        let provider = MockProvider {
            events: vec![
                event("web-1.a", "BackOff"),
                event("web-1.b", "BackOff"),
                event("web-1.c", "Pulled"),
            ],
            ..Default::default()
        };

        let collector = WorkloadCollector::new(Arc::new(provider));
        let events = collector.events_for_namespace("default").await.unwrap();

        assert_eq!(events.len(), 2);
        let backoff = events.get("web-1_default_BackOff").unwrap();
        assert_eq!(backoff.object, "Pod/web-1");
        assert_eq!(backoff.source, "kubelet, node-1");
        assert_eq!(backoff.name, "web-1.b");

        assert!(collector
            .events_for_namespace("other")
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_split_image() {
        let cases = [
            ("nginx", ("nginx", "latest")),
            ("nginx:1.25", ("nginx", "1.25")),
            ("registry:5000/app", ("registry:5000/app", "latest")),
            ("registry:5000/app:v2", ("registry:5000/app", "v2")),
            ("repo/app@sha256:abc", ("repo/app", "sha256:abc")),
        ];

        for (image, (repo, version)) in cases {
            assert_eq!(
                split_image(image),
                (repo.to_string(), version.to_string()),
                "image {image}"
            );
        }
    }

    #[test]
    fn test_node_roles_ignore_other_labels() {
        let labels = map(&[("node-role.kubernetes.io/master", ""), ("zone", "a")]);
        assert_eq!(normalize::node_roles(&labels), "master");
        assert_eq!(normalize::node_roles(&map(&[("zone", "a")])), "");
    }
}
