//! Rule evaluation over a batch of samples

use serde_json::json;

use super::patterns::{scan_logs, PatternRule};
use super::rule::{ClassificationRule, Interpolation, IssueTemplate};
use crate::models::{Issue, ResourceSample, Severity, SeverityScale};

/// Rule used for samples whose collection failed
pub const COLLECTION_FAILED_RULE: &str = "collection_failed";

/// Severity and text for samples that could not be collected
#[derive(Debug, Clone)]
pub struct DegradedRule {
    pub severity: Severity,
    pub template: IssueTemplate,
}

/// Evaluates a fixed rule set against samples.
///
/// Output order is samples in input order, then rules in declaration order,
/// then log patterns; the same input always yields the same list.
///
/// A degraded sample yields its "Cannot access" issue first. Rules that
/// test for absent data are then skipped for it, while status and
/// attribute rules and rules over the metrics that were collected still run.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<ClassificationRule>,
    degraded: DegradedRule,
    patterns: Vec<PatternRule>,
    scale: SeverityScale,
    scope: String,
}

impl Classifier {
    pub fn new(rules: Vec<ClassificationRule>, degraded: DegradedRule, scale: SeverityScale) -> Self {
        Self {
            rules,
            degraded,
            patterns: Vec::new(),
            scale,
            scope: String::new(),
        }
    }

    /// Scope label for `{scope}` (resource group, namespace, organization)
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Log patterns applied to each sample's `log_lines`
    pub fn with_patterns(mut self, patterns: Vec<PatternRule>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn scale(&self) -> SeverityScale {
        self.scale
    }

    pub fn classify(&self, samples: &[ResourceSample]) -> Vec<Issue> {
        let mut issues = Vec::new();
        for sample in samples {
            let degraded = sample.collection_error.as_deref();
            if let Some(error) = degraded {
                issues.push(self.degraded_issue(sample, error));
            }

            for rule in &self.rules {
                if degraded.is_some() && rule.checks_absence() {
                    continue;
                }
                if let Some(observed) = rule.evaluate(sample) {
                    let vars = Interpolation {
                        resource: &sample.resource_name,
                        value: &observed.value,
                        threshold: &observed.threshold,
                        scope: &self.scope,
                    };
                    issues.push(build_issue(sample, &rule.name, rule.severity, &rule.template, &vars));
                }
            }

            if !self.patterns.is_empty() && !sample.log_lines.is_empty() {
                issues.extend(scan_logs(sample, &self.patterns));
            }
        }
        issues
    }

    fn degraded_issue(&self, sample: &ResourceSample, error: &str) -> Issue {
        let reason = error.lines().find(|l| !l.trim().is_empty()).unwrap_or(error).trim();
        let vars = Interpolation {
            resource: &sample.resource_name,
            value: reason,
            threshold: "",
            scope: &self.scope,
        };
        let mut issue = build_issue(
            sample,
            COLLECTION_FAILED_RULE,
            self.degraded.severity,
            &self.degraded.template,
            &vars,
        );
        issue.details = Some(json!({
            "resource_kind": sample.resource_kind,
            "stderr": error,
        }));
        issue
    }
}

fn build_issue(
    sample: &ResourceSample,
    rule: &str,
    severity: Severity,
    template: &IssueTemplate,
    vars: &Interpolation<'_>,
) -> Issue {
    let mut details = json!({
        "resource_name": sample.resource_name,
        "resource_kind": sample.resource_kind,
        "observed_at": sample.observed_at.to_rfc3339(),
    });
    if !sample.metrics.is_empty() {
        details["metrics"] = json!(sample.metrics);
    }
    if !sample.attributes.is_empty() {
        details["attributes"] = json!(sample.attributes);
    }
    if let Some(status) = &sample.raw_status {
        details["status"] = json!(status);
    }

    Issue {
        title: template.render(&template.title, vars),
        severity,
        expected: template.render(&template.expected, vars),
        actual: template.render(&template.actual, vars),
        reproduce_hint: sample.source_command.clone(),
        next_steps: template.render(&template.next_steps, vars),
        details: Some(details),
        resource_id: sample.resource_id.clone(),
        rule: rule.to_string(),
        correlation_key: sample.correlation_key.clone(),
    }
}
