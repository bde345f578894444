//! kubectl output: pod and ingress lists, `kubectl top` text

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::networking::v1::Ingress;
use serde::Deserialize;

use super::metric;
use super::units::{parse_cpu_millicores, parse_memory_mi};
use crate::collector::Invocation;
use crate::models::{ResourceKind, ResourceSample};

/// GCE ingress controller annotation holding per-backend health
pub const BACKENDS_ANNOTATION: &str = "ingress.kubernetes.io/backends";

/// `kubectl get <kind> -o json` envelope
#[derive(Debug, Clone, Deserialize)]
#[serde(bound = "T: serde::de::DeserializeOwned")]
pub struct ItemList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Base `kubectl` invocation scoped to a namespace and context
pub fn kubectl(namespace: &str, context: Option<&str>) -> Invocation {
    Invocation::new("kubectl")
        .opt_flag("--context", context)
        .args(["-n", namespace])
}

pub fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or("unknown")
}

pub fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|s| s.phase.as_deref())
}

pub fn has_container(pod: &Pod, container: &str) -> bool {
    pod.spec
        .as_ref()
        .map(|spec| spec.containers.iter().any(|c| c.name == container))
        .unwrap_or(false)
}

/// Sum of container restarts reported in the pod status
pub fn pod_restarts(pod: &Pod) -> f64 {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| statuses.iter().map(|c| f64::from(c.restart_count)).sum())
        .unwrap_or(0.0)
}

/// Container limits as (millicores, Mi); each side is `None` when unset
pub fn container_limits(pod: &Pod, container: &str) -> (Option<f64>, Option<f64>) {
    let limits = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.containers.iter().find(|c| c.name == container))
        .and_then(|c| c.resources.as_ref())
        .and_then(|r| r.limits.as_ref());

    match limits {
        Some(limits) => (
            limits.get("cpu").and_then(|q| parse_cpu_millicores(&q.0)),
            limits.get("memory").and_then(|q| parse_memory_mi(&q.0)),
        ),
        None => (None, None),
    }
}

/// Control-plane pod as a sample: phase as status, restarts as a metric
pub fn component_sample(pod: &Pod, namespace: &str, command: &Invocation) -> ResourceSample {
    let name = pod_name(pod);
    let mut sample = ResourceSample::new(
        format!("{}/{}", namespace, name),
        name,
        ResourceKind::IstioComponent,
    )
    .with_source_command(command.to_string())
    .with_metric(metric::RESTART_COUNT, pod_restarts(pod));

    if let Some(phase) = pod_phase(pod) {
        sample = sample.with_status(phase);
    }
    if let Some(app) = pod.metadata.labels.as_ref().and_then(|l| l.get("app")) {
        sample = sample.with_attribute("app", app);
    }
    sample
}

/// Per-backend health from the GCE backends annotation; `None` when the
/// annotation is missing
pub fn backend_health(ingress: &Ingress) -> Option<Result<BTreeMap<String, String>, serde_json::Error>> {
    let raw = ingress
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(BACKENDS_ANNOTATION))?;
    Some(serde_json::from_str(raw))
}

/// Ingress as a sample; backend counts stay absent without health data and
/// an unreadable annotation degrades the sample
pub fn ingress_sample(ingress: &Ingress, namespace: &str, command: &Invocation) -> ResourceSample {
    let name = ingress.metadata.name.as_deref().unwrap_or("unknown");
    let sample = ResourceSample::new(format!("{}/{}", namespace, name), name, ResourceKind::Ingress)
        .with_source_command(command.to_string());

    let backends = match backend_health(ingress) {
        None => return sample,
        Some(Ok(backends)) => backends,
        Some(Err(e)) => {
            return sample.with_failed_query(BACKENDS_ANNOTATION, &format!("invalid JSON: {}", e))
        }
    };

    let unhealthy: Vec<&str> = backends
        .iter()
        .filter(|(_, state)| !state.eq_ignore_ascii_case("HEALTHY"))
        .map(|(name, _)| name.as_str())
        .collect();

    let status = if unhealthy.is_empty() { "HEALTHY" } else { "UNHEALTHY" };
    let mut sample = sample
        .with_status(status)
        .with_metric(metric::BACKEND_COUNT, backends.len() as f64)
        .with_metric(metric::UNHEALTHY_BACKENDS, unhealthy.len() as f64);
    if !unhealthy.is_empty() {
        sample = sample.with_attribute("unhealthy_backends", unhealthy.join(","));
    }
    sample
}

/// One row of `kubectl top pod --containers --no-headers`
#[derive(Debug, Clone, PartialEq)]
pub struct TopRow {
    pub pod: String,
    pub container: String,
    pub cpu_millicores: Option<f64>,
    pub memory_mi: Option<f64>,
}

pub fn parse_top_containers(text: &str) -> Vec<TopRow> {
    text.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 || fields[0] == "POD" {
                return None;
            }
            Some(TopRow {
                pod: fields[0].to_string(),
                container: fields[1].to_string(),
                cpu_millicores: parse_cpu_millicores(fields[2]),
                memory_mi: parse_memory_mi(fields[3]),
            })
        })
        .collect()
}
