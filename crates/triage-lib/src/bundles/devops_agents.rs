//! Azure DevOps agent pool and license checks
//!
//! Severity scale is inverted here: 4 is the most urgent.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;

use super::Bundle;
use crate::classifier::{ClassificationRule, Classifier, DegradedRule, IssueTemplate, Subject};
use crate::collector::{require_az_extension, verify_auth, Collector, Invocation};
use crate::config::{require, AuthMode, Settings};
use crate::error::TriageError;
use crate::models::{Issue, ResourceKind, ResourceSample, Severity, SeverityScale};
use crate::normalizer::devops::{agent_pool_sample, license_sample, Agent, AgentPoolInfo, UserList};
use crate::normalizer::metric;

const SCALE: SeverityScale = SeverityScale::FourIsMostSevere;

pub const SUMMARY_RULE: &str = "organization_summary";

pub struct DevopsAgentsBundle {
    org: String,
    auth: AuthMode,
    pat_present: bool,
    lookback_weeks: u32,
    classifier: Classifier,
}

impl DevopsAgentsBundle {
    pub fn from_settings(settings: &Settings) -> Result<Self, TriageError> {
        let org = require(&settings.azure_devops_org, "AZURE_DEVOPS_ORG")?;
        let classifier = Classifier::new(
            rules(
                settings.agent_utilization_threshold,
                settings.license_utilization_threshold,
                settings.lookback_weeks,
            ),
            degraded(),
            SCALE,
        )
        .with_scope(org);

        Ok(Self {
            org: org.to_string(),
            auth: settings.auth_type,
            pat_present: settings
                .azure_devops_ext_pat
                .as_deref()
                .map(|p| !p.trim().is_empty())
                .unwrap_or(false),
            lookback_weeks: settings.lookback_weeks,
            classifier,
        })
    }

    fn pool_list_invocation(&self) -> Invocation {
        Invocation::new("az").args(["pipelines", "pool", "list", "--org", &self.org, "-o", "json"])
    }

    fn agent_list_invocation(&self, pool: &AgentPoolInfo) -> Invocation {
        Invocation::new("az")
            .args(["pipelines", "agent", "list", "--pool-id"])
            .arg(pool.id.to_string())
            .args(["--org", &self.org, "--include-assigned-request", "-o", "json"])
    }

    fn user_list_invocation(&self) -> Invocation {
        Invocation::new("az").args(["devops", "user", "list", "--org", &self.org, "--top", "10000", "-o", "json"])
    }

    /// Roll-up across pools, only when at least one pool raised an issue
    fn organization_summary(&self, samples: &[ResourceSample], issues: &[Issue]) -> Option<Issue> {
        let pool_ids: BTreeSet<&str> = samples
            .iter()
            .filter(|s| s.resource_kind == ResourceKind::AgentPool)
            .map(|s| s.resource_id.as_str())
            .collect();
        let pool_issues: Vec<&Issue> = issues
            .iter()
            .filter(|i| pool_ids.contains(i.resource_id.as_str()))
            .collect();
        let affected: BTreeSet<&str> = pool_issues.iter().map(|i| i.resource_id.as_str()).collect();
        let worst = pool_issues
            .iter()
            .map(|i| i.severity)
            .reduce(|a, b| SCALE.most_severe(a, b))?;

        let n = affected.len();
        let pools = if n == 1 { "pool" } else { "pools" };
        let names: Vec<&str> = samples
            .iter()
            .filter(|s| affected.contains(s.resource_id.as_str()))
            .map(|s| s.resource_name.as_str())
            .collect();

        Some(Issue {
            title: format!("{} {} with issues in organization `{}`", n, pools, self.org),
            severity: worst,
            expected: format!("All {} agent pools in `{}` are healthy", pool_ids.len(), self.org),
            actual: format!("{} of {} agent pools have issues: {}", n, pool_ids.len(), names.join(", ")),
            reproduce_hint: self.pool_list_invocation().to_string(),
            next_steps: "Review the per-pool issues and the agent pools page in Organization Settings".to_string(),
            details: Some(json!({
                "pools_with_issues": names,
                "total_pools": pool_ids.len(),
                "issue_count": pool_issues.len(),
            })),
            resource_id: self.org.clone(),
            rule: SUMMARY_RULE.to_string(),
            correlation_key: None,
        })
    }
}

fn rules(utilization_threshold: f64, license_threshold: f64, lookback_weeks: u32) -> Vec<ClassificationRule> {
    let license_window = format!(
        "Active licensed users over the last {} week(s) at {{value}}%",
        lookback_weeks
    );
    vec![
        ClassificationRule::new(
            "no_agents",
            Subject::metric(metric::TOTAL_AGENTS).equals(0.0),
            Severity::level(1),
            IssueTemplate::new(
                "Agent pool `{resource}` has no agents",
                "At least one agent registered in `{resource}`",
                "No agents registered",
                "Register agents in `{resource}` or remove the unused pool from `{scope}`",
            ),
        )
        .only_for(ResourceKind::AgentPool),
        ClassificationRule::new(
            "all_agents_offline",
            Subject::metric(metric::OFFLINE_AGENTS).equals_metric(metric::TOTAL_AGENTS),
            Severity::level(4),
            IssueTemplate::new(
                "All agents offline in pool `{resource}`",
                "Agents in `{resource}` are online",
                "All {value} agent(s) are offline",
                "Check the agent hosts and restart the agent service; pipelines targeting `{resource}` are blocked",
            ),
        )
        .and(Subject::metric(metric::TOTAL_AGENTS).greater_than(0.0))
        .only_for(ResourceKind::AgentPool),
        ClassificationRule::new(
            "agents_offline",
            Subject::metric(metric::OFFLINE_AGENTS).greater_than(0.0),
            Severity::level(2),
            IssueTemplate::new(
                "Offline agents in pool `{resource}`",
                "All agents in `{resource}` are online",
                "{value} agent(s) are offline",
                "Check connectivity and service status on the offline agent hosts",
            ),
        )
        .and(Subject::metric(metric::ONLINE_AGENTS).greater_than(0.0))
        .only_for(ResourceKind::AgentPool),
        ClassificationRule::new(
            "high_agent_utilization",
            Subject::metric(metric::UTILIZATION_PERCENT).greater_than(utilization_threshold),
            Severity::level(2),
            IssueTemplate::new(
                "High agent utilization in pool `{resource}`",
                "Busy agents below {threshold}% of online agents",
                "{value}% of online agents are running jobs",
                "Add agents to `{resource}` or spread pipelines across pools",
            ),
        )
        .only_for(ResourceKind::AgentPool),
        ClassificationRule::new(
            "low_license_utilization",
            Subject::metric(metric::LICENSE_UTILIZATION_PERCENT).less_than(license_threshold),
            Severity::level(2),
            IssueTemplate::new(
                "Low license utilization in organization `{resource}`",
                "Active licensed users at or above {threshold}%",
                license_window,
                "Reassign or downgrade licenses of users who have not signed in recently",
            ),
        )
        .only_for(ResourceKind::Organization),
    ]
}

fn degraded() -> DegradedRule {
    DegradedRule {
        severity: Severity::level(3),
        template: IssueTemplate::new(
            "Cannot access `{resource}` in organization `{scope}`",
            "`{resource}` is readable with the configured credentials",
            "Query failed: {value}",
            "Check that the PAT or service principal has read access to agent pools and users",
        ),
    }
}

#[async_trait]
impl Bundle for DevopsAgentsBundle {
    fn name(&self) -> &'static str {
        "devops_agents"
    }

    fn scale(&self) -> SeverityScale {
        SCALE
    }

    fn scope(&self) -> String {
        self.org.clone()
    }

    fn reproduce_hint(&self) -> String {
        self.pool_list_invocation().to_string()
    }

    async fn collect(&self, collector: &Collector) -> Result<Vec<ResourceSample>, TriageError> {
        require_az_extension(collector, "azure-devops").await?;
        verify_auth(collector, self.auth, self.pat_present).await?;

        let pools: Vec<AgentPoolInfo> = collector
            .list("agent pools", &self.pool_list_invocation())
            .await?;

        let fetched = collector
            .collect_each(pools, |pool| self.agent_list_invocation(pool))
            .await?;
        let mut samples: Vec<ResourceSample> = fetched
            .into_iter()
            .map(|c| agent_pool_sample(&self.org, &c.item, c.result, &c.invocation))
            .collect();

        let users_invocation = self.user_list_invocation();
        let users = collector.fetch::<UserList>(&users_invocation).await?;
        samples.push(license_sample(
            &self.org,
            users,
            Duration::weeks(i64::from(self.lookback_weeks)),
            Utc::now(),
            &users_invocation,
        ));
        Ok(samples)
    }

    fn classify(&self, samples: &[ResourceSample]) -> Vec<Issue> {
        let mut issues = self.classifier.classify(samples);
        if let Some(summary) = self.organization_summary(samples, &issues) {
            issues.push(summary);
        }
        issues
    }
}
