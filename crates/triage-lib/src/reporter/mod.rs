//! Issue feed and human report output
//!
//! Everything a run persists goes through [`Reporter`]. Files are written
//! to a temporary file in the output directory and renamed into place, so
//! a reader never observes a partial `<bundle>_issues.json`.

mod summary;
mod text;

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::TriageError;
use crate::models::{Issue, ResourceSample, SeverityScale};

pub use summary::{ResourceStatus, ResourceSummary, RunSummary};
pub use text::render_report;

/// Rule name of the optional "no issues" record
pub const HEALTHY_RULE: &str = "healthy";

/// Everything known about one bundle run once classification is done
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub bundle: String,
    pub scope: String,
    pub scale: SeverityScale,
    pub samples: Vec<ResourceSample>,
    pub issues: Vec<Issue>,
    pub summary: RunSummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Paths written for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportFiles {
    pub issues: PathBuf,
    pub report: PathBuf,
    pub metrics: PathBuf,
}

/// Writes run output into one directory
#[derive(Debug, Clone)]
pub struct Reporter {
    output_dir: PathBuf,
}

impl Reporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn issues_path(&self, bundle: &str) -> PathBuf {
        self.output_dir.join(format!("{}_issues.json", bundle))
    }

    pub fn report_path(&self, bundle: &str) -> PathBuf {
        self.output_dir.join(format!("{}_report.txt", bundle))
    }

    pub fn metrics_path(&self, bundle: &str) -> PathBuf {
        self.output_dir.join(format!("{}_metrics.prom", bundle))
    }

    /// Write `<bundle>_issues.json`; an empty list is written as `[]`
    pub fn write_issues(&self, bundle: &str, issues: &[Issue]) -> Result<PathBuf, TriageError> {
        let json = serde_json::to_string_pretty(issues)?;
        let path = self.issues_path(bundle);
        write_atomic(&path, json.as_bytes())?;
        info!(
            event = "issues_written",
            bundle = bundle,
            count = issues.len(),
            path = %path.display(),
            "Issue feed written"
        );
        Ok(path)
    }

    /// Write `<bundle>_report.txt`
    pub fn write_report(&self, report: &RunReport) -> Result<PathBuf, TriageError> {
        let path = self.report_path(&report.bundle);
        write_atomic(&path, render_report(report).as_bytes())?;
        Ok(path)
    }

    /// Write `<bundle>_metrics.prom` from pre-rendered exposition text
    pub fn write_metrics(&self, bundle: &str, exposition: &str) -> Result<PathBuf, TriageError> {
        let path = self.metrics_path(bundle);
        write_atomic(&path, exposition.as_bytes())?;
        Ok(path)
    }
}

/// Temp file in the target's directory, then rename over the target
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), TriageError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| TriageError::Report(e.error))?;
    Ok(())
}

/// Informational record written when a run found nothing
pub fn healthy_marker(bundle: &str, scope: &str, scale: SeverityScale, reproduce_hint: &str) -> Issue {
    Issue {
        title: format!("No issues found for `{}` in `{}`", bundle, scope),
        severity: scale.informational(),
        expected: format!("Resources in `{}` are healthy", scope),
        actual: format!("All `{}` checks passed", bundle),
        reproduce_hint: reproduce_hint.to_string(),
        next_steps: "No action required".to_string(),
        details: None,
        resource_id: scope.to_string(),
        rule: HEALTHY_RULE.to_string(),
        correlation_key: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceKind, Severity};

    fn issue() -> Issue {
        Issue {
            title: "High CPU usage on `plan-a`".into(),
            severity: Severity::level(2),
            expected: "CPU below 80%".into(),
            actual: "CPU at 85%".into(),
            reproduce_hint: "az monitor metrics list".into(),
            next_steps: "Scale out".into(),
            details: None,
            resource_id: "/plans/plan-a".into(),
            rule: "high_cpu".into(),
            correlation_key: None,
        }
    }

    #[test]
    fn test_zero_issues_writes_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path());

        let path = reporter.write_issues("app_service_plan", &[]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "[]");
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(parsed.as_array().unwrap().is_empty());
    }

    #[test]
    fn test_issue_json_schema() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path());

        let path = reporter.write_issues("app_service_plan", &[issue()]).unwrap();
        assert_eq!(path, dir.path().join("app_service_plan_issues.json"));

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let first = &parsed[0];
        for field in ["title", "severity", "expected", "actual", "reproduce_hint", "next_steps"] {
            assert!(first.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(first["severity"], 2);
        assert!(first.get("details").is_none());
        assert!(first.get("correlation_key").is_none());
    }

    #[test]
    fn test_rewrite_replaces_previous_feed() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path());

        reporter.write_issues("aks", &[issue(), issue()]).unwrap();
        reporter.write_issues("aks", &[]).unwrap();

        assert_eq!(std::fs::read_to_string(reporter.issues_path("aks")).unwrap(), "[]");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_output_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("runs").join("today");
        let reporter = Reporter::new(&nested);

        reporter.write_metrics("istio", "# empty\n").unwrap();
        assert!(nested.join("istio_metrics.prom").exists());
    }

    #[test]
    fn test_report_file_lists_resources_and_issues() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path());
        let samples = vec![ResourceSample::new("/plans/plan-a", "plan-a", ResourceKind::AppServicePlan)
            .with_metric("cpu_percent", 85.0)];
        let issues = vec![issue()];
        let summary = RunSummary::compute(&samples, &issues, SeverityScale::OneIsMostSevere);
        let report = RunReport {
            bundle: "app_service_plan".into(),
            scope: "rg-prod".into(),
            scale: SeverityScale::OneIsMostSevere,
            samples,
            issues,
            summary,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        let path = reporter.write_report(&report).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("plan-a"));
        assert!(text.contains("High CPU usage"));
        assert!(text.contains("cpu_percent=85"));
    }

    #[test]
    fn test_healthy_marker_uses_informational_severity() {
        let one = healthy_marker("aks", "rg", SeverityScale::OneIsMostSevere, "az aks show");
        let four = healthy_marker("devops_agents", "org", SeverityScale::FourIsMostSevere, "az");
        assert_eq!(one.severity, Severity::level(4));
        assert_eq!(four.severity, Severity::level(1));
        assert_eq!(one.rule, HEALTHY_RULE);
    }
}
