//! Per-resource aggregate status
//!
//! Each issue stands on its own in the feed; the summary only rolls them
//! up per resource so the report can show one line per resource with the
//! most urgent severity under the bundle's scale.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Issue, ResourceKind, ResourceSample, Severity, SeverityScale};

/// Aggregate status of a resource or a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// No issues
    Healthy,
    /// Low-urgency issues, or the resource could not be read
    Degraded,
    /// At least one high or critical issue
    Unhealthy,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Healthy => write!(f, "healthy"),
            ResourceStatus::Degraded => write!(f, "degraded"),
            ResourceStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Urgency rank (see [`SeverityScale::urgency`]) from which an issue marks
/// its resource unhealthy
const UNHEALTHY_URGENCY: u8 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub resource_id: String,
    pub resource_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_kind: Option<ResourceKind>,
    pub status: ResourceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worst_severity: Option<Severity>,
    pub issue_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: ResourceStatus,
    pub resources: Vec<ResourceSummary>,
    pub total_issues: usize,
    /// Issue count per severity value
    pub by_severity: BTreeMap<u8, usize>,
}

impl RunSummary {
    /// Roll issues up per resource, in sample order. Issues attributed to an
    /// id with no sample (organization roll-ups) get their own row after
    /// the sampled resources.
    pub fn compute(samples: &[ResourceSample], issues: &[Issue], scale: SeverityScale) -> Self {
        let mut resources: Vec<ResourceSummary> = samples
            .iter()
            .map(|s| ResourceSummary {
                resource_id: s.resource_id.clone(),
                resource_name: s.resource_name.clone(),
                resource_kind: Some(s.resource_kind),
                status: if s.is_degraded() {
                    ResourceStatus::Degraded
                } else {
                    ResourceStatus::Healthy
                },
                worst_severity: None,
                issue_count: 0,
            })
            .collect();

        let mut by_severity = BTreeMap::new();
        for issue in issues {
            *by_severity.entry(issue.severity.value()).or_insert(0) += 1;

            let idx = match resources.iter().position(|r| r.resource_id == issue.resource_id) {
                Some(idx) => idx,
                None => {
                    resources.push(ResourceSummary {
                        resource_id: issue.resource_id.clone(),
                        resource_name: issue.resource_id.clone(),
                        resource_kind: None,
                        status: ResourceStatus::Healthy,
                        worst_severity: None,
                        issue_count: 0,
                    });
                    resources.len() - 1
                }
            };

            let entry = &mut resources[idx];
            entry.issue_count += 1;
            entry.worst_severity = Some(match entry.worst_severity {
                Some(current) => scale.most_severe(current, issue.severity),
                None => issue.severity,
            });
            let issue_status = if scale.urgency(issue.severity) >= UNHEALTHY_URGENCY {
                ResourceStatus::Unhealthy
            } else {
                ResourceStatus::Degraded
            };
            entry.status = worse(entry.status, issue_status);
        }

        Self {
            status: Self::compute_status(&resources),
            resources,
            total_issues: issues.len(),
            by_severity,
        }
    }

    /// Overall status from resource statuses
    pub fn compute_status(resources: &[ResourceSummary]) -> ResourceStatus {
        let mut has_degraded = false;

        for resource in resources {
            match resource.status {
                ResourceStatus::Unhealthy => return ResourceStatus::Unhealthy,
                ResourceStatus::Degraded => has_degraded = true,
                ResourceStatus::Healthy => {}
            }
        }

        if has_degraded {
            ResourceStatus::Degraded
        } else {
            ResourceStatus::Healthy
        }
    }

    pub fn resources_with_issues(&self) -> usize {
        self.resources.iter().filter(|r| r.issue_count > 0).count()
    }
}

fn worse(a: ResourceStatus, b: ResourceStatus) -> ResourceStatus {
    use ResourceStatus::*;
    match (a, b) {
        (Unhealthy, _) | (_, Unhealthy) => Unhealthy,
        (Degraded, _) | (_, Degraded) => Degraded,
        _ => Healthy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(resource: &str, severity: u8) -> Issue {
        Issue {
            title: "t".into(),
            severity: Severity::level(severity),
            expected: String::new(),
            actual: String::new(),
            reproduce_hint: String::new(),
            next_steps: String::new(),
            details: None,
            resource_id: resource.into(),
            rule: "r".into(),
            correlation_key: None,
        }
    }

    fn samples() -> Vec<ResourceSample> {
        vec![
            ResourceSample::new("a", "a", ResourceKind::AgentPool),
            ResourceSample::new("b", "b", ResourceKind::AgentPool),
        ]
    }

    #[test]
    fn test_no_issues_is_healthy() {
        let summary = RunSummary::compute(&samples(), &[], SeverityScale::OneIsMostSevere);
        assert_eq!(summary.status, ResourceStatus::Healthy);
        assert_eq!(summary.total_issues, 0);
        assert_eq!(summary.resources.len(), 2);
    }

    #[test]
    fn test_worst_severity_follows_scale() {
        let issues = vec![issue("a", 2), issue("a", 4)];

        let one = RunSummary::compute(&samples(), &issues, SeverityScale::OneIsMostSevere);
        assert_eq!(one.resources[0].worst_severity, Some(Severity::level(2)));
        assert_eq!(one.resources[0].status, ResourceStatus::Unhealthy);
        assert_eq!(one.resources[1].status, ResourceStatus::Healthy);

        let four = RunSummary::compute(&samples(), &issues, SeverityScale::FourIsMostSevere);
        assert_eq!(four.resources[0].worst_severity, Some(Severity::level(4)));
        assert_eq!(four.resources[0].issue_count, 2);
        assert_eq!(four.by_severity.get(&4), Some(&1));
    }

    #[test]
    fn test_low_urgency_only_is_degraded() {
        let summary = RunSummary::compute(&samples(), &[issue("b", 4)], SeverityScale::OneIsMostSevere);
        assert_eq!(summary.resources[1].status, ResourceStatus::Degraded);
        assert_eq!(summary.status, ResourceStatus::Degraded);
    }

    #[test]
    fn test_issue_without_sample_gets_own_row() {
        let summary = RunSummary::compute(&samples(), &[issue("org", 3)], SeverityScale::FourIsMostSevere);
        assert_eq!(summary.resources.len(), 3);
        assert_eq!(summary.resources[2].resource_id, "org");
        assert_eq!(summary.resources_with_issues(), 1);
    }
}
