//! AKS cluster and node pool checks

use async_trait::async_trait;

use super::Bundle;
use crate::classifier::{ClassificationRule, Classifier, DegradedRule, IssueTemplate, Subject};
use crate::collector::{Collector, Invocation};
use crate::config::{require, Settings};
use crate::error::TriageError;
use crate::models::{Issue, ResourceKind, ResourceSample, Severity, SeverityScale};
use crate::normalizer::azure::{
    aks_cluster_sample, aks_node_pool_samples, metrics_invocation, AksCluster, AKS_CPU_METRIC,
    AKS_MEMORY_METRIC,
};
use crate::normalizer::metric;

const SCALE: SeverityScale = SeverityScale::OneIsMostSevere;

pub struct AksBundle {
    resource_group: String,
    cluster: String,
    subscription: Option<String>,
    metrics_interval: String,
    metrics_offset: String,
    classifier: Classifier,
}

impl AksBundle {
    pub fn from_settings(settings: &Settings) -> Result<Self, TriageError> {
        let resource_group = require(&settings.azure_resource_group, "AZURE_RESOURCE_GROUP")?;
        let cluster = require(&settings.aks_cluster, "AKS_CLUSTER")?;
        let classifier = Classifier::new(
            rules(settings.cpu_threshold, settings.memory_threshold),
            degraded(),
            SCALE,
        )
        .with_scope(resource_group);

        Ok(Self {
            resource_group: resource_group.to_string(),
            cluster: cluster.to_string(),
            subscription: settings.azure_subscription_id.clone(),
            metrics_interval: settings.metrics_interval.clone(),
            metrics_offset: settings.metrics_offset.clone(),
            classifier,
        })
    }

    fn show_invocation(&self) -> Invocation {
        Invocation::new("az")
            .args(["aks", "show", "-g", &self.resource_group, "-n", &self.cluster])
            .opt_flag("--subscription", self.subscription.as_deref())
            .args(["-o", "json"])
    }
}

fn rules(cpu_threshold: f64, memory_threshold: f64) -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new(
            "cluster_provisioning_failed",
            Subject::attribute("provisioning_state").is_not("Succeeded"),
            Severity::level(1),
            IssueTemplate::new(
                "AKS cluster `{resource}` in `{scope}` is in provisioning state {value}",
                "Provisioning state is Succeeded",
                "Provisioning state is {value}",
                "Inspect the latest cluster operation with `az aks operation show-latest` and the activity log of `{scope}`",
            ),
        )
        .only_for(ResourceKind::AksCluster),
        ClassificationRule::new(
            "cluster_not_running",
            Subject::Status.is_not("Running"),
            Severity::level(1),
            IssueTemplate::new(
                "AKS cluster `{resource}` in `{scope}` is not running",
                "Power state is Running",
                "Power state is {value}",
                "Start the cluster with `az aks start` if it was stopped intentionally, otherwise check service health",
            ),
        )
        .only_for(ResourceKind::AksCluster),
        ClassificationRule::new(
            "high_node_cpu",
            Subject::metric(metric::CPU_PERCENT).greater_than(cpu_threshold),
            Severity::level(2),
            IssueTemplate::new(
                "High node CPU usage in AKS cluster `{resource}`",
                "Average node CPU below {threshold}%",
                "Average node CPU at {value}%",
                "Check `kubectl top nodes` and consider enabling the cluster autoscaler or adding nodes",
            ),
        )
        .only_for(ResourceKind::AksCluster),
        ClassificationRule::new(
            "high_node_memory",
            Subject::metric(metric::MEMORY_PERCENT).greater_than(memory_threshold),
            Severity::level(2),
            IssueTemplate::new(
                "High node memory usage in AKS cluster `{resource}`",
                "Average node memory working set below {threshold}%",
                "Average node memory working set at {value}%",
                "Look for pods without memory limits and consider larger VM sizes",
            ),
        )
        .only_for(ResourceKind::AksCluster),
        ClassificationRule::new(
            "no_node_metrics",
            Subject::metric(metric::CPU_PERCENT).missing(),
            Severity::level(4),
            IssueTemplate::new(
                "No node metrics for AKS cluster `{resource}`",
                "Node CPU and memory metrics are reported",
                "Azure Monitor returned no data points",
                "Check that platform metrics are available for the cluster",
            ),
        )
        .and(Subject::metric(metric::MEMORY_PERCENT).missing())
        .only_for(ResourceKind::AksCluster),
        ClassificationRule::new(
            "node_pool_provisioning_failed",
            Subject::attribute("provisioning_state").is("Failed"),
            Severity::level(2),
            IssueTemplate::new(
                "Node pool `{resource}` failed provisioning",
                "Provisioning state is Succeeded",
                "Provisioning state is {value}",
                "Run `az aks nodepool show` for the pool and retry the last operation",
            ),
        )
        .only_for(ResourceKind::NodePool),
        ClassificationRule::new(
            "node_pool_at_max_count",
            Subject::metric(metric::NODE_COUNT).equals_metric(metric::MAX_COUNT),
            Severity::level(3),
            IssueTemplate::new(
                "Node pool `{resource}` is at its autoscaler maximum",
                "Node count below the autoscaler maximum of {threshold}",
                "Node count is {value}",
                "Raise the pool's max count or add another node pool; pending pods cannot be scheduled",
            ),
        )
        .only_for(ResourceKind::NodePool),
    ]
}

fn degraded() -> DegradedRule {
    DegradedRule {
        severity: Severity::level(3),
        template: IssueTemplate::new(
            "Cannot access node metrics for AKS cluster `{resource}`",
            "Metrics for `{resource}` are readable",
            "Metrics query failed: {value}",
            "Check that the identity has Monitoring Reader on `{scope}`",
        ),
    }
}

#[async_trait]
impl Bundle for AksBundle {
    fn name(&self) -> &'static str {
        "aks"
    }

    fn scale(&self) -> SeverityScale {
        SCALE
    }

    fn scope(&self) -> String {
        format!("{}/{}", self.resource_group, self.cluster)
    }

    fn reproduce_hint(&self) -> String {
        self.show_invocation().to_string()
    }

    async fn collect(&self, collector: &Collector) -> Result<Vec<ResourceSample>, TriageError> {
        let show = self.show_invocation();
        let cluster: AksCluster = collector.list("AKS cluster", &show).await?;

        let metrics = metrics_invocation(
            &cluster.id,
            &[AKS_CPU_METRIC, AKS_MEMORY_METRIC],
            &self.metrics_interval,
            &self.metrics_offset,
        );
        let fetched = collector.fetch(&metrics).await?;

        let mut samples = vec![aks_cluster_sample(&cluster, fetched, &metrics)];
        samples.extend(aks_node_pool_samples(&cluster, &show));
        Ok(samples)
    }

    fn classify(&self, samples: &[ResourceSample]) -> Vec<Issue> {
        self.classifier.classify(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockRunner;
    use crate::collector::CommandOutput;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn settings() -> Settings {
        Settings {
            azure_resource_group: Some("rg-aks".into()),
            aks_cluster: Some("prod".into()),
            ..Settings::default()
        }
    }

    fn cluster(provisioning: &str, power: &str, pool_count: u32) -> Value {
        json!({
            "id": "/subscriptions/s/resourceGroups/rg-aks/providers/Microsoft.ContainerService/managedClusters/prod",
            "name": "prod",
            "provisioningState": provisioning,
            "powerState": { "code": power },
            "kubernetesVersion": "1.28.5",
            "agentPoolProfiles": [
                {
                    "name": "system",
                    "count": 3,
                    "vmSize": "Standard_D4s_v5",
                    "provisioningState": "Succeeded",
                    "powerState": { "code": "Running" },
                    "enableAutoScaling": false,
                    "mode": "System"
                },
                {
                    "name": "user",
                    "count": pool_count,
                    "provisioningState": "Succeeded",
                    "powerState": { "code": "Running" },
                    "enableAutoScaling": true,
                    "minCount": 1,
                    "maxCount": 5,
                    "mode": "User"
                }
            ]
        })
    }

    fn node_metrics(cpu: f64, memory: f64) -> Value {
        json!({ "value": [
            { "name": { "value": AKS_CPU_METRIC }, "timeseries": [{ "data": [{ "average": cpu, "maximum": cpu }] }] },
            { "name": { "value": AKS_MEMORY_METRIC }, "timeseries": [{ "data": [{ "average": memory, "maximum": memory }] }] }
        ]})
    }

    async fn run(runner: MockRunner) -> Vec<Issue> {
        let collector = Collector::new(Arc::new(runner));
        let bundle = AksBundle::from_settings(&settings()).unwrap();
        let samples = bundle.collect(&collector).await.unwrap();
        bundle.classify(&samples)
    }

    #[tokio::test]
    async fn test_healthy_cluster_has_no_issues() {
        let issues = run(MockRunner::new()
            .on_json("aks show", cluster("Succeeded", "Running", 2))
            .on_json("metrics list", node_metrics(40.0, 55.0)))
        .await;
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[tokio::test]
    async fn test_stopped_failed_cluster() {
        let issues = run(MockRunner::new()
            .on_json("aks show", cluster("Failed", "Stopped", 2))
            .on_json("metrics list", json!({ "value": [] })))
        .await;

        let rules: Vec<&str> = issues.iter().map(|i| i.rule.as_str()).collect();
        assert_eq!(
            rules,
            vec!["cluster_provisioning_failed", "cluster_not_running", "no_node_metrics"]
        );
        assert_eq!(issues[0].severity, Severity::level(1));
        assert_eq!(issues[1].actual, "Power state is Stopped");
    }

    #[tokio::test]
    async fn test_pool_at_max_and_high_cpu() {
        let issues = run(MockRunner::new()
            .on_json("aks show", cluster("Succeeded", "Running", 5))
            .on_json("metrics list", node_metrics(92.5, 50.0)))
        .await;

        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].rule, "high_node_cpu");
        assert_eq!(issues[0].actual, "Average node CPU at 92.5%");
        assert_eq!(issues[1].rule, "node_pool_at_max_count");
        assert_eq!(issues[1].title, "Node pool `prod/user` is at its autoscaler maximum");
        assert_eq!(issues[1].severity, Severity::level(3));
    }

    #[tokio::test]
    async fn test_metrics_failure_degrades_cluster_only() {
        let issues = run(MockRunner::new()
            .on_json("aks show", cluster("Succeeded", "Running", 5))
            .on("metrics list", CommandOutput::failure(1, "ERROR: throttled")))
        .await;

        let rules: Vec<&str> = issues.iter().map(|i| i.rule.as_str()).collect();
        assert_eq!(rules, vec!["collection_failed", "node_pool_at_max_count"]);
    }

    #[tokio::test]
    async fn test_metrics_failure_keeps_cluster_state_rules() {
        let issues = run(MockRunner::new()
            .on_json("aks show", cluster("Failed", "Stopped", 2))
            .on("metrics list", CommandOutput::failure(1, "ERROR: throttled")))
        .await;

        let rules: Vec<&str> = issues.iter().map(|i| i.rule.as_str()).collect();
        assert_eq!(
            rules,
            vec!["collection_failed", "cluster_provisioning_failed", "cluster_not_running"]
        );
    }

    #[tokio::test]
    async fn test_auth_failure_on_show_is_fatal() {
        let runner = MockRunner::new().on(
            "aks show",
            CommandOutput::failure(1, "ERROR: Please run 'az login' to setup account."),
        );
        let collector = Collector::new(Arc::new(runner));
        let bundle = AksBundle::from_settings(&settings()).unwrap();
        let err = bundle.collect(&collector).await.unwrap_err();
        assert!(matches!(err, TriageError::Authentication(_)));
    }
}
