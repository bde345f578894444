//! Azure activity log: failed operations grouped by correlation id

use async_trait::async_trait;

use super::Bundle;
use crate::classifier::{
    dedupe_by_correlation, ClassificationRule, Classifier, DegradedRule, IssueTemplate, Subject,
};
use crate::collector::{ensure_provider_registered, Collector, Invocation, PollPolicy};
use crate::config::{require, Settings};
use crate::error::TriageError;
use crate::models::{Issue, ResourceKind, ResourceSample, Severity, SeverityScale};
use crate::normalizer::azure::{activity_log_sample, ActivityLogEntry};

const SCALE: SeverityScale = SeverityScale::OneIsMostSevere;

const INSIGHTS_PROVIDER: &str = "Microsoft.Insights";

/// Operation status that makes an event reportable
const FAILED_STATUS: &str = "Failed";

pub struct ActivityLogBundle {
    resource_group: String,
    subscription: Option<String>,
    offset: String,
    registration: PollPolicy,
    classifier: Classifier,
}

impl ActivityLogBundle {
    pub fn from_settings(settings: &Settings) -> Result<Self, TriageError> {
        let resource_group = require(&settings.azure_resource_group, "AZURE_RESOURCE_GROUP")?;
        Ok(Self {
            resource_group: resource_group.to_string(),
            subscription: settings.azure_subscription_id.clone(),
            offset: settings.azure_activity_log_offset.clone(),
            registration: PollPolicy::default(),
            classifier: Classifier::new(rules(), degraded(), SCALE).with_scope(resource_group),
        })
    }

    /// Override the provider registration wait
    pub fn with_registration_policy(mut self, policy: PollPolicy) -> Self {
        self.registration = policy;
        self
    }

    fn list_invocation(&self) -> Invocation {
        Invocation::new("az")
            .args(["monitor", "activity-log", "list", "-g", &self.resource_group])
            .args(["--offset", &self.offset])
            .opt_flag("--subscription", self.subscription.as_deref())
            .args(["-o", "json"])
    }
}

fn level_rule(name: &str, level: &str, severity: u8) -> ClassificationRule {
    ClassificationRule::new(
        name,
        Subject::Status.is(level),
        Severity::level(severity),
        IssueTemplate::new(
            format!("{} activity log event `{{resource}}` in resource group `{{scope}}`", level),
            "No failed or degraded operations in the activity log",
            "Operation failed at level {value}",
            "Review the event with `az monitor activity-log list --correlation-id` and check the caller and target resource",
        ),
    )
    .and(Subject::attribute("status").is(FAILED_STATUS))
    .only_for(ResourceKind::ActivityLogEvent)
}

fn rules() -> Vec<ClassificationRule> {
    vec![
        level_rule("activity_critical", "Critical", 1),
        level_rule("activity_error", "Error", 2),
        level_rule("activity_warning", "Warning", 3),
    ]
}

fn degraded() -> DegradedRule {
    DegradedRule {
        severity: Severity::level(3),
        template: IssueTemplate::new(
            "Cannot read activity log event `{resource}`",
            "Activity log entries are readable",
            "Query failed: {value}",
            "Check that the identity has Reader on `{scope}`",
        ),
    }
}

#[async_trait]
impl Bundle for ActivityLogBundle {
    fn name(&self) -> &'static str {
        "activity_log"
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
        ensure_provider_registered(collector, INSIGHTS_PROVIDER, self.registration).await?;

        let invocation = self.list_invocation();
        let entries: Vec<ActivityLogEntry> = collector.list("activity log", &invocation).await?;
        let mut samples: Vec<ResourceSample> = entries
            .iter()
            .map(|entry| activity_log_sample(entry, &invocation))
            .collect();
        samples.sort_by_key(|s| s.observed_at);
        Ok(samples)
    }

    fn classify(&self, samples: &[ResourceSample]) -> Vec<Issue> {
        dedupe_by_correlation(self.classifier.classify(samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockRunner;
    use crate::collector::CommandOutput;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn settings() -> Settings {
        Settings {
            azure_resource_group: Some("rg-prod".into()),
            ..Settings::default()
        }
    }

    fn bundle() -> ActivityLogBundle {
        ActivityLogBundle::from_settings(&settings())
            .unwrap()
            .with_registration_policy(PollPolicy {
                max_attempts: 3,
                delay: Duration::from_millis(1),
            })
    }

    fn entry(op: &str, level: &str, correlation: &str, at: &str) -> Value {
        entry_with_status(op, level, "Failed", correlation, at)
    }

    fn entry_with_status(op: &str, level: &str, status: &str, correlation: &str, at: &str) -> Value {
        json!({
            "correlationId": correlation,
            "operationName": { "value": op, "localizedValue": op },
            "status": { "value": status },
            "level": level,
            "eventTimestamp": at,
            "caller": "deploy@contoso.com",
            "resourceId": format!("/subscriptions/s/resourceGroups/rg-prod/providers/{}", op)
        })
    }

    #[tokio::test]
    async fn test_sorted_and_deduplicated() {
        let runner = MockRunner::new()
            .on("provider show", CommandOutput::success("Registered\n"))
            .on_json(
                "activity-log list",
                json!([
                    entry("Microsoft.Web/sites/write", "Error", "c-1", "2024-05-01T10:05:00Z"),
                    entry("Microsoft.Web/sites/write", "Error", "c-1", "2024-05-01T10:00:00Z"),
                    entry("Microsoft.Sql/servers/delete", "Critical", "c-2", "2024-05-01T09:00:00Z"),
                    entry("Microsoft.Web/sites/read", "Informational", "c-3", "2024-05-01T11:00:00Z"),
                    entry("Microsoft.Network/nsg/write", "Warning", "c-1", "2024-05-01T12:00:00Z")
                ]),
            );
        let collector = Collector::new(Arc::new(runner));
        let bundle = bundle();

        let samples = bundle.collect(&collector).await.unwrap();
        assert!(samples.windows(2).all(|w| w[0].observed_at <= w[1].observed_at));

        let issues = bundle.classify(&samples);
        let rules: Vec<&str> = issues.iter().map(|i| i.rule.as_str()).collect();
        assert_eq!(rules, vec!["activity_critical", "activity_error", "activity_warning"]);
        assert_eq!(issues[1].correlation_key.as_deref(), Some("c-1"));
        assert_eq!(
            issues[1].details.as_ref().unwrap()["observed_at"],
            "2024-05-01T10:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_succeeded_operations_are_not_reported() {
        let runner = MockRunner::new()
            .on("provider show", CommandOutput::success("Registered\n"))
            .on_json(
                "activity-log list",
                json!([
                    entry_with_status("Microsoft.Web/sites/write", "Warning", "Succeeded", "c-1", "2024-05-01T10:00:00Z"),
                    entry_with_status("Microsoft.Web/sites/write", "Error", "Started", "c-2", "2024-05-01T10:01:00Z"),
                    entry("Microsoft.Web/sites/write", "Error", "c-3", "2024-05-01T10:02:00Z")
                ]),
            );
        let collector = Collector::new(Arc::new(runner));
        let bundle = bundle();

        let samples = bundle.collect(&collector).await.unwrap();
        assert_eq!(samples.len(), 3);
        let issues = bundle.classify(&samples);
        assert_eq!(issues.len(), 1, "{:?}", issues);
        assert_eq!(issues[0].rule, "activity_error");
        assert_eq!(issues[0].correlation_key.as_deref(), Some("c-3"));
        assert_eq!(issues[0].actual, "Operation failed at level Error");
    }

    #[tokio::test]
    async fn test_registers_provider_before_listing() {
        let runner = Arc::new(
            MockRunner::new()
                .on("provider show", CommandOutput::success("NotRegistered"))
                .on("provider show", CommandOutput::success("Registering"))
                .on("provider show", CommandOutput::success("Registered"))
                .on("provider register", CommandOutput::success(""))
                .on_json("activity-log list", json!([])),
        );
        let collector = Collector::new(runner.clone());

        let samples = bundle().collect(&collector).await.unwrap();
        assert!(samples.is_empty());
        let calls = runner.calls();
        assert!(calls[1].contains("provider register --namespace Microsoft.Insights"));
        assert!(calls.last().unwrap().contains("activity-log list"));
    }

    #[tokio::test]
    async fn test_registration_timeout_is_fatal() {
        let runner = MockRunner::new()
            .on("provider show", CommandOutput::success("Registering"))
            .on("provider register", CommandOutput::success(""));
        let err = bundle()
            .collect(&Collector::new(Arc::new(runner)))
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::WaitTimedOut { attempts: 3, .. }));
    }
}
