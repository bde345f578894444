//! App Service Plan health and cost-optimization checks

use async_trait::async_trait;
use serde_json::json;

use super::Bundle;
use crate::classifier::recommend::{candidates, primary_recommendation};
use crate::classifier::{
    format_number, ClassificationRule, Classifier, DegradedRule, IssueTemplate, Subject,
};
use crate::collector::{Collector, Invocation};
use crate::config::{require, Settings};
use crate::error::TriageError;
use crate::models::{Issue, ResourceKind, ResourceSample, Severity, SeverityScale};
use crate::normalizer::azure::{
    app_service_plan_sample, metrics_invocation, AppServicePlan, APP_SERVICE_CPU_METRIC,
    APP_SERVICE_MEMORY_METRIC,
};
use crate::normalizer::metric;

const SCALE: SeverityScale = SeverityScale::OneIsMostSevere;

pub const COST_RULE: &str = "cost_optimization";

pub struct AppServicePlanBundle {
    resource_group: String,
    subscription: Option<String>,
    metrics_interval: String,
    metrics_offset: String,
    low_cpu_threshold: f64,
    low_memory_threshold: f64,
    classifier: Classifier,
}

impl AppServicePlanBundle {
    pub fn from_settings(settings: &Settings) -> Result<Self, TriageError> {
        let resource_group = require(&settings.azure_resource_group, "AZURE_RESOURCE_GROUP")?;
        let classifier = Classifier::new(
            rules(settings.cpu_threshold, settings.memory_threshold),
            degraded(),
            SCALE,
        )
        .with_scope(resource_group);

        Ok(Self {
            resource_group: resource_group.to_string(),
            subscription: settings.azure_subscription_id.clone(),
            metrics_interval: settings.metrics_interval.clone(),
            metrics_offset: settings.metrics_offset.clone(),
            low_cpu_threshold: settings.low_cpu_threshold,
            low_memory_threshold: settings.low_memory_threshold,
            classifier,
        })
    }

    fn list_invocation(&self) -> Invocation {
        Invocation::new("az")
            .args(["appservice", "plan", "list", "-g", &self.resource_group])
            .opt_flag("--subscription", self.subscription.as_deref())
            .args(["-o", "json"])
    }

    /// Sev 4 record for a plan that stays well below both low thresholds
    fn cost_issue(&self, sample: &ResourceSample) -> Option<Issue> {
        let cpu_max = sample.metric(metric::CPU_MAX_PERCENT)?;
        let memory_max = sample.metric(metric::MEMORY_MAX_PERCENT)?;
        if !(cpu_max < self.low_cpu_threshold && memory_max < self.low_memory_threshold) {
            return None;
        }

        let sku = sample.attribute("sku")?;
        let capacity = sample.metric(metric::CAPACITY).map(|c| c as u32).unwrap_or(1);
        let all = candidates(sku, capacity);
        let primary = primary_recommendation(&all)?;

        Some(Issue {
            title: format!(
                "Underutilized App Service Plan `{}` in `{}`",
                sample.resource_name, self.resource_group
            ),
            severity: Severity::level(4),
            expected: format!(
                "Peak CPU above {}% or peak memory above {}%",
                format_number(self.low_cpu_threshold),
                format_number(self.low_memory_threshold)
            ),
            actual: format!(
                "Peak CPU {}%, peak memory {}% on {} x {}",
                format_number(cpu_max),
                format_number(memory_max),
                capacity,
                sku
            ),
            reproduce_hint: sample.source_command.clone(),
            next_steps: primary.describe(),
            details: Some(json!({
                "resource_name": sample.resource_name,
                "sku": sku,
                "capacity": capacity,
                "cpu_max_percent": cpu_max,
                "memory_max_percent": memory_max,
                "primary_recommendation": primary,
                "recommendations": all,
            })),
            resource_id: sample.resource_id.clone(),
            rule: COST_RULE.to_string(),
            correlation_key: None,
        })
    }
}

fn rules(cpu_threshold: f64, memory_threshold: f64) -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new(
            "high_cpu",
            Subject::metric(metric::CPU_PERCENT).greater_than(cpu_threshold),
            Severity::level(2),
            IssueTemplate::new(
                "High CPU usage on App Service Plan `{resource}` in `{scope}`",
                "Average CPU below {threshold}%",
                "Average CPU at {value}%",
                "Scale up or scale out `{resource}`, or move CPU-heavy apps to another plan",
            ),
        ),
        ClassificationRule::new(
            "high_memory",
            Subject::metric(metric::MEMORY_PERCENT).greater_than(memory_threshold),
            Severity::level(2),
            IssueTemplate::new(
                "High memory usage on App Service Plan `{resource}` in `{scope}`",
                "Average memory below {threshold}%",
                "Average memory at {value}%",
                "Check apps on `{resource}` for memory leaks or move to a larger SKU",
            ),
        ),
        ClassificationRule::new(
            "plan_not_ready",
            Subject::Status.is_not("Ready"),
            Severity::level(1),
            IssueTemplate::new(
                "App Service Plan `{resource}` in `{scope}` is not ready",
                "Plan status is Ready",
                "Plan status is {value}",
                "Check the plan's activity log and Azure service health for `{scope}`",
            ),
        ),
        ClassificationRule::new(
            "no_metric_data",
            Subject::metric(metric::CPU_PERCENT).missing(),
            Severity::level(4),
            IssueTemplate::new(
                "No metric data for App Service Plan `{resource}` in `{scope}`",
                "CPU and memory metrics are reported",
                "Azure Monitor returned no data points",
                "Verify the plan has running apps and that diagnostics are enabled",
            ),
        )
        .and(Subject::metric(metric::MEMORY_PERCENT).missing()),
    ]
    .into_iter()
    .map(|r| r.only_for(ResourceKind::AppServicePlan))
    .collect()
}

fn degraded() -> DegradedRule {
    DegradedRule {
        severity: Severity::level(3),
        template: IssueTemplate::new(
            "Cannot access metrics for App Service Plan `{resource}` in `{scope}`",
            "Metrics for `{resource}` are readable",
            "Metrics query failed: {value}",
            "Check that the identity has Monitoring Reader on `{scope}`",
        ),
    }
}

#[async_trait]
impl Bundle for AppServicePlanBundle {
    fn name(&self) -> &'static str {
        "app_service_plan"
    }

    fn scale(&self) -> SeverityScale {
        SCALE
    }

    fn scope(&self) -> String {
        self.resource_group.clone()
    }

    fn reproduce_hint(&self) -> String {
        self.list_invocation().to_string()
    }

    async fn collect(&self, collector: &Collector) -> Result<Vec<ResourceSample>, TriageError> {
        let plans: Vec<AppServicePlan> = collector
            .list("App Service Plans", &self.list_invocation())
            .await?;

        let fetched = collector
            .collect_each(plans, |plan| {
                metrics_invocation(
                    &plan.id,
                    &[APP_SERVICE_CPU_METRIC, APP_SERVICE_MEMORY_METRIC],
                    &self.metrics_interval,
                    &self.metrics_offset,
                )
            })
            .await?;

        Ok(fetched
            .into_iter()
            .map(|c| app_service_plan_sample(&c.item, c.result, &c.invocation))
            .collect())
    }

    fn classify(&self, samples: &[ResourceSample]) -> Vec<Issue> {
        let mut issues = self.classifier.classify(samples);
        issues.extend(
            samples
                .iter()
                .filter(|s| !s.is_degraded())
                .filter_map(|s| self.cost_issue(s)),
        );
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockRunner;
    use crate::collector::CommandOutput;
    use serde_json::Value;
    use std::sync::Arc;

    fn settings() -> Settings {
        Settings {
            azure_resource_group: Some("rg-prod".into()),
            ..Settings::default()
        }
    }

    fn metrics(cpu: &[f64], memory: &[f64]) -> Value {
        let series = |values: &[f64]| {
            json!([{ "data": values.iter().enumerate().map(|(i, v)| json!({
                "timeStamp": format!("2024-05-01T{:02}:00:00Z", i),
                "average": v,
                "maximum": v
            })).collect::<Vec<_>>() }])
        };
        json!({ "value": [
            { "name": { "value": "CpuPercentage" }, "timeseries": series(cpu) },
            { "name": { "value": "MemoryPercentage" }, "timeseries": series(memory) }
        ]})
    }

    fn plan(name: &str, sku: &str, capacity: u32) -> Value {
        json!({
            "id": format!("/subscriptions/s/resourceGroups/rg-prod/providers/Microsoft.Web/serverfarms/{}", name),
            "name": name,
            "location": "westeurope",
            "status": "Ready",
            "numberOfSites": 2,
            "sku": { "name": sku, "tier": "Standard", "capacity": capacity }
        })
    }

    #[tokio::test]
    async fn test_high_cpu_plan() {
        let runner = MockRunner::new()
            .on_json("appservice plan list", json!([plan("busy", "S1", 2)]))
            .on_json("serverfarms/busy", metrics(&[85.0, 85.0], &[40.0, 40.0]));
        let collector = Collector::new(Arc::new(runner));
        let bundle = AppServicePlanBundle::from_settings(&settings()).unwrap();

        let samples = bundle.collect(&collector).await.unwrap();
        let issues = bundle.classify(&samples);

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule, "high_cpu");
        assert_eq!(issues[0].severity, Severity::level(2));
        assert!(issues[0].title.contains("busy"));
        assert!(issues[0].actual.contains("85%"));
        assert!(issues[0].reproduce_hint.starts_with("az monitor metrics list"));
    }

    #[tokio::test]
    async fn test_cpu_at_threshold_is_quiet() {
        let runner = MockRunner::new()
            .on_json("appservice plan list", json!([plan("edge", "S1", 1)]))
            .on_json("serverfarms/edge", metrics(&[80.0], &[80.0]));
        let collector = Collector::new(Arc::new(runner));
        let bundle = AppServicePlanBundle::from_settings(&settings()).unwrap();

        let samples = bundle.collect(&collector).await.unwrap();
        assert!(bundle.classify(&samples).is_empty());
    }

    #[tokio::test]
    async fn test_underutilized_plan_prefers_tier_downgrade() {
        let runner = MockRunner::new()
            .on_json("appservice plan list", json!([plan("idle", "S3", 4)]))
            .on_json("serverfarms/idle", metrics(&[5.0, 8.0], &[10.0, 12.0]));
        let collector = Collector::new(Arc::new(runner));
        let bundle = AppServicePlanBundle::from_settings(&settings()).unwrap();

        let samples = bundle.collect(&collector).await.unwrap();
        let issues = bundle.classify(&samples);

        assert_eq!(issues.len(), 1);
        let issue = &issues[0];
        assert_eq!(issue.rule, COST_RULE);
        assert_eq!(issue.severity, Severity::level(4));
        let details = issue.details.as_ref().unwrap();
        assert_eq!(details["primary_recommendation"]["kind"], "tier_downgrade");
        assert_eq!(details["primary_recommendation"]["to_sku"], "S2");
        assert_eq!(details["recommendations"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_metric_failure_degrades_one_plan() {
        let runner = MockRunner::new()
            .on_json(
                "appservice plan list",
                json!([plan("locked", "S1", 1), plan("busy", "S1", 1)]),
            )
            .on(
                "serverfarms/locked",
                CommandOutput::failure(1, "ERROR: (AuthorizationFailed) no access"),
            )
            .on_json("serverfarms/busy", metrics(&[90.0], &[20.0]));
        let collector = Collector::new(Arc::new(runner));
        let bundle = AppServicePlanBundle::from_settings(&settings()).unwrap();

        let samples = bundle.collect(&collector).await.unwrap();
        assert_eq!(samples.len(), 2);
        let issues = bundle.classify(&samples);

        let rules: Vec<&str> = issues.iter().map(|i| i.rule.as_str()).collect();
        assert_eq!(rules, vec!["collection_failed", "high_cpu"]);
        assert!(issues[0].title.starts_with("Cannot access"));
    }

    #[tokio::test]
    async fn test_empty_metrics_raise_no_data() {
        let runner = MockRunner::new()
            .on_json("appservice plan list", json!([plan("quiet", "S1", 1)]))
            .on_json("serverfarms/quiet", json!({ "value": [] }));
        let collector = Collector::new(Arc::new(runner));
        let bundle = AppServicePlanBundle::from_settings(&settings()).unwrap();

        let samples = bundle.collect(&collector).await.unwrap();
        let issues = bundle.classify(&samples);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule, "no_metric_data");
    }

    #[tokio::test]
    async fn test_list_failure_is_fatal() {
        let runner = MockRunner::new().on(
            "appservice plan list",
            CommandOutput::failure(3, "ERROR: Resource group 'rg-prod' could not be found."),
        );
        let collector = Collector::new(Arc::new(runner));
        let bundle = AppServicePlanBundle::from_settings(&settings()).unwrap();

        let err = bundle.collect(&collector).await.unwrap_err();
        assert!(matches!(err, TriageError::ListFailed { .. }));
    }
}
