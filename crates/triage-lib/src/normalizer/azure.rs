//! Azure CLI output shapes (`az appservice`, `az aks`, `az monitor`)

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::metric;
use crate::collector::{Collected, Invocation};
use crate::models::{ResourceKind, ResourceSample};

/// `az monitor metrics list` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsResponse {
    #[serde(default)]
    pub value: Vec<MetricEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricEntry {
    pub name: LocalizableString,
    #[serde(default)]
    pub timeseries: Vec<TimeSeries>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizableString {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub localized_value: Option<String>,
}

impl LocalizableString {
    /// Localized text, falling back to the raw value
    pub fn text(&self) -> Option<&str> {
        self.localized_value
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.value.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeSeries {
    #[serde(default)]
    pub data: Vec<DataPoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    #[serde(default)]
    pub time_stamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub average: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// Aggregate of one metric over the queried window
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSummary {
    pub average: f64,
    pub maximum: f64,
    pub points: usize,
    pub latest: Option<DateTime<Utc>>,
}

impl MetricsResponse {
    /// Summarize the data points of `name`; `None` when the window holds no
    /// data for it
    pub fn summarize(&self, name: &str) -> Option<MetricSummary> {
        let entry = self
            .value
            .iter()
            .find(|e| e.name.value.as_deref() == Some(name))?;

        let points: Vec<&DataPoint> = entry
            .timeseries
            .iter()
            .flat_map(|ts| ts.data.iter())
            .filter(|p| p.average.is_some())
            .collect();
        if points.is_empty() {
            return None;
        }

        let sum: f64 = points.iter().filter_map(|p| p.average).sum();
        let maximum = points
            .iter()
            .filter_map(|p| p.maximum.or(p.average))
            .fold(f64::MIN, f64::max);

        Some(MetricSummary {
            average: sum / points.len() as f64,
            maximum,
            points: points.len(),
            latest: points.iter().filter_map(|p| p.time_stamp).max(),
        })
    }
}

/// `az monitor metrics list` invocation for one resource
pub fn metrics_invocation(
    resource_id: &str,
    metrics: &[&str],
    interval: &str,
    offset: &str,
) -> Invocation {
    Invocation::new("az")
        .args(["monitor", "metrics", "list", "--resource", resource_id, "--metric"])
        .args(metrics.iter().copied())
        .args(["--interval", interval, "--aggregation", "Average", "Maximum"])
        .args(["--offset", offset, "-o", "json"])
}

/// One element of `az appservice plan list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppServicePlan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub sku: Option<Sku>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub number_of_sites: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sku {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub capacity: Option<u32>,
}

pub const APP_SERVICE_CPU_METRIC: &str = "CpuPercentage";
pub const APP_SERVICE_MEMORY_METRIC: &str = "MemoryPercentage";

/// Fold a plan and its metrics into a sample
pub fn app_service_plan_sample(
    plan: &AppServicePlan,
    metrics: Collected<MetricsResponse>,
    command: &Invocation,
) -> ResourceSample {
    let sku = plan.sku.clone().unwrap_or_default();
    let mut sample = ResourceSample::new(&plan.id, &plan.name, ResourceKind::AppServicePlan)
        .with_source_command(command.to_string())
        .with_optional_metric(metric::CAPACITY, sku.capacity.map(f64::from))
        .with_optional_metric(metric::SITE_COUNT, plan.number_of_sites.map(f64::from));

    if let Some(status) = &plan.status {
        sample = sample.with_status(status);
    }
    if let Some(name) = sku.name {
        sample = sample.with_attribute("sku", name);
    }
    if let Some(tier) = sku.tier {
        sample = sample.with_attribute("tier", tier);
    }
    if let Some(location) = &plan.location {
        sample = sample.with_attribute("location", location);
    }

    match metrics {
        Collected::Payload(response) => {
            let cpu = response.summarize(APP_SERVICE_CPU_METRIC);
            let memory = response.summarize(APP_SERVICE_MEMORY_METRIC);
            let latest = cpu.iter().chain(memory.iter()).filter_map(|s| s.latest).max();
            sample
                .with_optional_metric(metric::CPU_PERCENT, cpu.as_ref().map(|s| s.average))
                .with_optional_metric(metric::CPU_MAX_PERCENT, cpu.as_ref().map(|s| s.maximum))
                .with_optional_metric(metric::MEMORY_PERCENT, memory.as_ref().map(|s| s.average))
                .with_optional_metric(metric::MEMORY_MAX_PERCENT, memory.as_ref().map(|s| s.maximum))
                .observed(latest)
        }
        Collected::Failed { stderr } => sample.with_collection_error(stderr),
    }
}

/// `az aks show` response (fields used by triage)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AksCluster {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub provisioning_state: Option<String>,
    #[serde(default)]
    pub power_state: Option<PowerState>,
    #[serde(default)]
    pub kubernetes_version: Option<String>,
    #[serde(default)]
    pub agent_pool_profiles: Vec<AgentPoolProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PowerState {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolProfile {
    pub name: String,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub vm_size: Option<String>,
    #[serde(default)]
    pub provisioning_state: Option<String>,
    #[serde(default)]
    pub power_state: Option<PowerState>,
    #[serde(default)]
    pub enable_auto_scaling: Option<bool>,
    #[serde(default)]
    pub min_count: Option<u32>,
    #[serde(default)]
    pub max_count: Option<u32>,
    #[serde(default)]
    pub mode: Option<String>,
}

pub const AKS_CPU_METRIC: &str = "node_cpu_usage_percentage";
pub const AKS_MEMORY_METRIC: &str = "node_memory_working_set_percentage";

/// Cluster-level sample: power state as status, provisioning state and
/// version as attributes, node CPU/memory as metrics
pub fn aks_cluster_sample(
    cluster: &AksCluster,
    metrics: Collected<MetricsResponse>,
    command: &Invocation,
) -> ResourceSample {
    let node_count: u32 = cluster
        .agent_pool_profiles
        .iter()
        .filter_map(|p| p.count)
        .sum();

    let mut sample = ResourceSample::new(&cluster.id, &cluster.name, ResourceKind::AksCluster)
        .with_source_command(command.to_string())
        .with_metric(metric::NODE_COUNT, f64::from(node_count));

    if let Some(code) = cluster.power_state.as_ref().and_then(|p| p.code.as_ref()) {
        sample = sample.with_status(code);
    }
    if let Some(state) = &cluster.provisioning_state {
        sample = sample.with_attribute("provisioning_state", state);
    }
    if let Some(version) = &cluster.kubernetes_version {
        sample = sample.with_attribute("kubernetes_version", version);
    }

    match metrics {
        Collected::Payload(response) => {
            let cpu = response.summarize(AKS_CPU_METRIC);
            let memory = response.summarize(AKS_MEMORY_METRIC);
            sample
                .with_optional_metric(metric::CPU_PERCENT, cpu.as_ref().map(|s| s.average))
                .with_optional_metric(metric::CPU_MAX_PERCENT, cpu.as_ref().map(|s| s.maximum))
                .with_optional_metric(metric::MEMORY_PERCENT, memory.as_ref().map(|s| s.average))
                .with_optional_metric(metric::MEMORY_MAX_PERCENT, memory.as_ref().map(|s| s.maximum))
        }
        Collected::Failed { stderr } => sample.with_collection_error(stderr),
    }
}

/// One sample per node pool of the cluster
pub fn aks_node_pool_samples(cluster: &AksCluster, command: &Invocation) -> Vec<ResourceSample> {
    cluster
        .agent_pool_profiles
        .iter()
        .map(|pool| {
            let autoscaling = pool.enable_auto_scaling.unwrap_or(false);
            let mut sample = ResourceSample::new(
                format!("{}/agentPools/{}", cluster.id, pool.name),
                format!("{}/{}", cluster.name, pool.name),
                ResourceKind::NodePool,
            )
            .with_source_command(command.to_string())
            .with_optional_metric(metric::NODE_COUNT, pool.count.map(f64::from));

            if autoscaling {
                sample = sample
                    .with_optional_metric(metric::MIN_COUNT, pool.min_count.map(f64::from))
                    .with_optional_metric(metric::MAX_COUNT, pool.max_count.map(f64::from));
            }
            if let Some(code) = pool.power_state.as_ref().and_then(|p| p.code.as_ref()) {
                sample = sample.with_status(code);
            }
            if let Some(state) = &pool.provisioning_state {
                sample = sample.with_attribute("provisioning_state", state);
            }
            if let Some(size) = &pool.vm_size {
                sample = sample.with_attribute("vm_size", size);
            }
            if let Some(mode) = &pool.mode {
                sample = sample.with_attribute("mode", mode);
            }
            sample
        })
        .collect()
}

/// One element of `az monitor activity-log list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub event_data_id: Option<String>,
    #[serde(default)]
    pub operation_name: Option<LocalizableString>,
    #[serde(default)]
    pub status: Option<LocalizableString>,
    #[serde(default)]
    pub sub_status: Option<LocalizableString>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub event_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub caller: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
}

/// Activity-log entry as a sample: level as status, correlation id as the
/// dedup key
pub fn activity_log_sample(entry: &ActivityLogEntry, command: &Invocation) -> ResourceSample {
    let operation = entry
        .operation_name
        .as_ref()
        .and_then(|o| o.text())
        .unwrap_or("unknown operation")
        .to_string();
    let resource_id = entry
        .resource_id
        .clone()
        .or_else(|| entry.event_data_id.clone())
        .unwrap_or_default();

    let mut sample = ResourceSample::new(resource_id, &operation, ResourceKind::ActivityLogEvent)
        .with_source_command(command.to_string())
        .with_attribute("operation", operation)
        .observed(entry.event_timestamp);

    if let Some(level) = &entry.level {
        sample = sample.with_status(level);
    }
    if let Some(status) = entry.status.as_ref().and_then(|s| s.text()) {
        sample = sample.with_attribute("status", status);
    }
    if let Some(sub_status) = entry.sub_status.as_ref().and_then(|s| s.text()) {
        if !sub_status.is_empty() {
            sample = sample.with_attribute("sub_status", sub_status);
        }
    }
    if let Some(caller) = &entry.caller {
        sample = sample.with_attribute("caller", caller);
    }
    if let Some(id) = &entry.correlation_id {
        sample = sample.with_correlation_key(id);
    }
    sample
}
