//! Conversion of raw Kubernetes objects into normalized records.

use super::pod_metrics::PodMetrics;
use super::quantity;
use crate::models::{
    ActiveJob, Container, ContainerMetric, CronJobStatus, DaemonSetStatus, DeploymentStatus,
    Event, GeneralInfo, JobStatus, Labels, Namespace, Node, PodOwner, PodStatus,
    StatefulSetStatus, Workload, WorkloadStatus,
};
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, Time};

const DEFAULT_IMAGE_VERSION: &str = "latest";

/// Split an image reference into repository and version.
///
/// Digests split on `@`. Tags split on the last `:` unless what follows it
/// contains a `/`, in which case the colon belonged to a registry port.
pub fn split_image(image: &str) -> (String, String) {
    if let Some((repo, digest)) = image.split_once('@') {
        return (repo.to_string(), digest.to_string());
    }

    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') && !tag.is_empty() => {
            (repo.to_string(), tag.to_string())
        }
        _ => (image.to_string(), DEFAULT_IMAGE_VERSION.to_string()),
    }
}

/// Main containers first, then init containers. Only main containers are
/// matched against `statuses` for restart counts.
pub fn build_container_list(
    containers: &[corev1::Container],
    init_containers: &[corev1::Container],
    statuses: &[corev1::ContainerStatus],
) -> Vec<Container> {
    let main = containers.iter().map(|c| {
        let restarts = statuses
            .iter()
            .find(|s| s.name == c.name)
            .map_or(0, |s| s.restart_count);
        to_container(c, restarts, false)
    });
    let init = init_containers.iter().map(|c| to_container(c, 0, true));

    main.chain(init).collect()
}

fn to_container(container: &corev1::Container, restarts: i32, is_init: bool) -> Container {
    let (image, image_version) = split_image(container.image.as_deref().unwrap_or_default());
    let resources = container.resources.as_ref();
    let limits = resources.and_then(|r| r.limits.as_ref());
    let requests = resources.and_then(|r| r.requests.as_ref());

    Container {
        name: container.name.clone(),
        image,
        image_version,
        request_cpu: quantity::cpu_millis(requests.and_then(|r| r.get("cpu"))),
        request_memory: quantity::bytes(requests.and_then(|r| r.get("memory"))),
        limit_cpu: quantity::cpu_millis(limits.and_then(|l| l.get("cpu"))),
        limit_memory: quantity::bytes(limits.and_then(|l| l.get("memory"))),
        restarts,
        is_init,
    }
}

fn template_containers(template: &corev1::PodTemplateSpec) -> Vec<Container> {
    match template.spec.as_ref() {
        Some(spec) => build_container_list(
            &spec.containers,
            spec.init_containers.as_deref().unwrap_or_default(),
            &[],
        ),
        None => Vec::new(),
    }
}

fn time(value: Option<&Time>) -> Option<DateTime<Utc>> {
    value.map(|t| t.0)
}

fn created(meta: &ObjectMeta) -> DateTime<Utc> {
    time(meta.creation_timestamp.as_ref()).unwrap_or_default()
}

fn labels(map: Option<&Labels>) -> Labels {
    map.cloned().unwrap_or_default()
}

fn match_labels(selector: Option<&LabelSelector>) -> Labels {
    labels(selector.and_then(|s| s.match_labels.as_ref()))
}

fn general_info(
    meta: &ObjectMeta,
    selector: Option<&LabelSelector>,
    containers: Vec<Container>,
) -> GeneralInfo {
    GeneralInfo {
        name: meta.name.clone().unwrap_or_default(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        labels: labels(meta.labels.as_ref()),
        annotations: labels(meta.annotations.as_ref()),
        selector: match_labels(selector),
        containers,
        creation_timestamp: created(meta),
    }
}

pub fn namespace(ns: &corev1::Namespace) -> Namespace {
    Namespace {
        name: ns.metadata.name.clone().unwrap_or_default(),
        status: ns
            .status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_default(),
        labels: labels(ns.metadata.labels.as_ref()),
        annotations: labels(ns.metadata.annotations.as_ref()),
        creation_timestamp: created(&ns.metadata),
    }
}

/// Role names taken from `node-role.kubernetes.io/<role>` style labels.
pub fn node_roles(node_labels: &Labels) -> String {
    let mut roles: Vec<&str> = node_labels
        .keys()
        .filter(|key| key.starts_with("node-role"))
        .filter_map(|key| key.split_once('/').map(|(_, role)| role))
        .filter(|role| !role.is_empty())
        .collect();
    roles.sort_unstable();
    roles.join(" ")
}

pub fn node(node: &corev1::Node) -> Node {
    let status = node.status.as_ref();
    let capacity = status.and_then(|s| s.capacity.as_ref());
    let info = status.and_then(|s| s.node_info.as_ref());
    let ready_reason = status
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"))
        .and_then(|c| c.reason.clone())
        .unwrap_or_default();
    let node_labels = labels(node.metadata.labels.as_ref());

    Node {
        name: node.metadata.name.clone().unwrap_or_default(),
        status: ready_reason,
        cpu: quantity::scaled(capacity.and_then(|c| c.get("cpu")), 0),
        memory: quantity::scaled(capacity.and_then(|c| c.get("memory")), 6),
        os_image: info.map(|i| i.os_image.clone()).unwrap_or_default(),
        kubelet_version: info.map(|i| i.kubelet_version.clone()).unwrap_or_default(),
        roles: node_roles(&node_labels),
        labels: node_labels,
        annotations: labels(node.metadata.annotations.as_ref()),
        creation_timestamp: created(&node.metadata),
    }
}

pub fn deployment(deployment: &Deployment) -> Workload {
    let spec = deployment.spec.as_ref();
    let status = deployment.status.as_ref();
    let containers = spec.map(|s| template_containers(&s.template)).unwrap_or_default();

    Workload::new(
        general_info(&deployment.metadata, spec.map(|s| &s.selector), containers),
        WorkloadStatus::Deployment(DeploymentStatus {
            desired: spec.and_then(|s| s.replicas).unwrap_or(1),
            ready: status.and_then(|s| s.ready_replicas).unwrap_or_default(),
            available: status.and_then(|s| s.available_replicas).unwrap_or_default(),
            up_to_date: status.and_then(|s| s.updated_replicas).unwrap_or_default(),
        }),
    )
}

pub fn daemonset(daemonset: &DaemonSet) -> Workload {
    let spec = daemonset.spec.as_ref();
    let status = daemonset.status.as_ref();
    let containers = spec.map(|s| template_containers(&s.template)).unwrap_or_default();

    Workload::new(
        general_info(&daemonset.metadata, spec.map(|s| &s.selector), containers),
        WorkloadStatus::DaemonSet(DaemonSetStatus {
            desired: status.map_or(0, |s| s.desired_number_scheduled),
            current: status.map_or(0, |s| s.current_number_scheduled),
            ready: status.map_or(0, |s| s.number_ready),
            up_to_date: status
                .and_then(|s| s.updated_number_scheduled)
                .unwrap_or_default(),
            available: status.and_then(|s| s.number_available).unwrap_or_default(),
        }),
    )
}

pub fn statefulset(statefulset: &StatefulSet) -> Workload {
    let spec = statefulset.spec.as_ref();
    let status = statefulset.status.as_ref();
    let containers = spec.map(|s| template_containers(&s.template)).unwrap_or_default();

    Workload::new(
        general_info(&statefulset.metadata, spec.map(|s| &s.selector), containers),
        WorkloadStatus::StatefulSet(StatefulSetStatus {
            replicas: status.map_or(0, |s| s.replicas),
            current: status.and_then(|s| s.current_replicas).unwrap_or_default(),
            ready: status.and_then(|s| s.ready_replicas).unwrap_or_default(),
            up_to_date: status.and_then(|s| s.updated_replicas).unwrap_or_default(),
            available: status.and_then(|s| s.available_replicas).unwrap_or_default(),
        }),
    )
}

pub fn pod(pod: &corev1::Pod) -> Workload {
    let status = pod.status.as_ref();
    let statuses = status
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default();
    let containers = match pod.spec.as_ref() {
        Some(spec) => build_container_list(
            &spec.containers,
            spec.init_containers.as_deref().unwrap_or_default(),
            statuses,
        ),
        None => Vec::new(),
    };

    let owners = pod
        .metadata
        .owner_references
        .iter()
        .flatten()
        .map(|o| PodOwner {
            api_version: o.api_version.clone(),
            kind: o.kind.clone(),
            uid: o.uid.clone(),
            name: o.name.clone(),
        })
        .collect();

    Workload::new(
        general_info(&pod.metadata, None, containers),
        WorkloadStatus::Pod(PodStatus {
            phase: status.and_then(|s| s.phase.clone()).unwrap_or_default(),
            restarts: statuses.iter().map(|s| s.restart_count).max().unwrap_or(0),
            owners,
        }),
    )
}

pub fn job(job: &Job) -> Workload {
    let spec = job.spec.as_ref();
    let status = job.status.as_ref();
    let containers = spec.map(|s| template_containers(&s.template)).unwrap_or_default();

    Workload::new(
        general_info(
            &job.metadata,
            spec.and_then(|s| s.selector.as_ref()),
            containers,
        ),
        WorkloadStatus::Job(JobStatus {
            active: status.and_then(|s| s.active).unwrap_or_default(),
            ready: status.and_then(|s| s.ready),
            failed: status.and_then(|s| s.failed).unwrap_or_default(),
            succeeded: status.and_then(|s| s.succeeded).unwrap_or_default(),
            start_time: time(status.and_then(|s| s.start_time.as_ref())),
            completion_time: time(status.and_then(|s| s.completion_time.as_ref())),
        }),
    )
}

pub fn cronjob(cronjob: &CronJob) -> Workload {
    let spec = cronjob.spec.as_ref();
    let status = cronjob.status.as_ref();
    let job_spec = spec.and_then(|s| s.job_template.spec.as_ref());
    let containers = job_spec
        .map(|s| template_containers(&s.template))
        .unwrap_or_default();

    let active = status
        .and_then(|s| s.active.as_ref())
        .into_iter()
        .flatten()
        .map(|r| ActiveJob {
            api_version: r.api_version.clone().unwrap_or_default(),
            name: r.name.clone().unwrap_or_default(),
            namespace: r.namespace.clone().unwrap_or_default(),
        })
        .collect();

    Workload::new(
        general_info(
            &cronjob.metadata,
            job_spec.and_then(|s| s.selector.as_ref()),
            containers,
        ),
        WorkloadStatus::CronJob(CronJobStatus {
            schedule: spec.map(|s| s.schedule.clone()).unwrap_or_default(),
            suspend: spec.and_then(|s| s.suspend),
            concurrency_policy: spec
                .and_then(|s| s.concurrency_policy.clone())
                .unwrap_or_default(),
            backoff_limit: job_spec.and_then(|s| s.backoff_limit),
            failed_jobs_history: spec.and_then(|s| s.failed_jobs_history_limit),
            successful_jobs_history: spec.and_then(|s| s.successful_jobs_history_limit),
            active,
            last_scheduled_time: time(status.and_then(|s| s.last_schedule_time.as_ref())),
            last_successful_time: time(status.and_then(|s| s.last_successful_time.as_ref())),
        }),
    )
}

/// One sample per container of the pod.
pub fn container_metrics(metrics: &PodMetrics, now: DateTime<Utc>) -> Vec<ContainerMetric> {
    let timestamp = metrics
        .timestamp
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|t| t.with_timezone(&Utc))
        .or_else(|| time(metrics.metadata.creation_timestamp.as_ref()))
        .unwrap_or(now);
    let pod_name = metrics.metadata.name.clone().unwrap_or_default();
    let namespace = metrics.metadata.namespace.clone().unwrap_or_default();

    metrics
        .containers
        .iter()
        .map(|c| ContainerMetric {
            pod_name: pod_name.clone(),
            namespace: namespace.clone(),
            container_name: c.name.clone(),
            cpu_usage: quantity::cpu_millis(c.usage.cpu.as_ref()),
            memory_usage: quantity::bytes(c.usage.memory.as_ref()),
            timestamp,
        })
        .collect()
}

pub fn event(event: &corev1::Event) -> Event {
    let involved = &event.involved_object;
    let source = event.source.as_ref();

    Event {
        last_seen: time(event.last_timestamp.as_ref()),
        first_seen: time(event.first_timestamp.as_ref()),
        count: event.count.unwrap_or_default(),
        name: event.metadata.name.clone().unwrap_or_default(),
        namespace: event.metadata.namespace.clone().unwrap_or_default(),
        event_type: event.type_.clone().unwrap_or_default(),
        reason: event.reason.clone().unwrap_or_default(),
        message: event.message.clone().unwrap_or_default(),
        object: format!(
            "{}/{}",
            involved.kind.as_deref().unwrap_or_default(),
            involved.name.as_deref().unwrap_or_default()
        ),
        source: format!(
            "{}, {}",
            source.and_then(|s| s.component.as_deref()).unwrap_or_default(),
            source.and_then(|s| s.host.as_deref()).unwrap_or_default()
        ),
        object_name: involved.name.clone().unwrap_or_default(),
    }
}
