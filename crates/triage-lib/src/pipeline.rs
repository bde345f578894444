//! collector -> normalizer -> classifier -> reporter, once per run

use std::time::Instant;

use chrono::Utc;
use tracing::warn;

use crate::bundles::Bundle;
use crate::collector::Collector;
use crate::error::TriageError;
use crate::observability::{RunMetrics, StructuredLogger};
use crate::reporter::{healthy_marker, ReportFiles, Reporter, RunReport, RunSummary};

/// Per-run switches that are not bundle scope
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Write an informational record when nothing was found
    pub emit_healthy_issue: bool,
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct BundleRun {
    pub report: RunReport,
    pub files: ReportFiles,
}

/// Run one bundle end to end.
///
/// A fatal collection error still leaves a `[]` issue feed behind (best
/// effort) before the error is returned, so consumers never read a feed
/// from an earlier run.
pub async fn run_bundle(
    bundle: &dyn Bundle,
    collector: &Collector,
    reporter: &Reporter,
    options: &RunOptions,
) -> Result<BundleRun, TriageError> {
    let name = bundle.name();
    let scope = bundle.scope();
    let scale = bundle.scale();
    let logger = StructuredLogger::new(name);
    let metrics = RunMetrics::new(name)?;

    let started_at = Utc::now();
    let timer = Instant::now();
    logger.log_run_started(&scope);

    let samples = match bundle.collect(collector).await {
        Ok(samples) => samples,
        Err(e) => {
            logger.log_run_failed(&e);
            if let Err(write_err) = reporter.write_issues(name, &[]) {
                warn!(bundle = name, error = %write_err, "Could not reset issue feed");
            }
            return Err(e);
        }
    };
    logger.log_collected(&samples);
    metrics.record_samples(&samples);

    let mut issues = bundle.classify(&samples);
    for issue in &issues {
        logger.log_issue(issue, scale);
    }
    metrics.record_issues(&issues);

    let summary = RunSummary::compute(&samples, &issues, scale);
    if issues.is_empty() && options.emit_healthy_issue {
        issues.push(healthy_marker(name, &scope, scale, &bundle.reproduce_hint()));
    }

    let finished_at = Utc::now();
    let duration_secs = timer.elapsed().as_secs_f64();
    metrics.observe_run_duration(duration_secs);
    metrics.set_finished_at(finished_at.timestamp());

    let report = RunReport {
        bundle: name.to_string(),
        scope,
        scale,
        samples,
        issues,
        summary,
        started_at,
        finished_at,
    };

    let files = ReportFiles {
        issues: reporter.write_issues(name, &report.issues)?,
        report: reporter.write_report(&report)?,
        metrics: reporter.write_metrics(name, &metrics.render()?)?,
    };
    logger.log_run_finished(&report.summary, duration_secs);

    Ok(BundleRun { report, files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockRunner;
    use crate::models::{Issue, ResourceKind, ResourceSample, Severity, SeverityScale};
    use crate::reporter::{ResourceStatus, HEALTHY_RULE};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Bundle with canned output
    struct Canned {
        samples: Vec<ResourceSample>,
        issues: Vec<Issue>,
        fail: bool,
    }

    #[async_trait]
    impl Bundle for Canned {
        fn name(&self) -> &'static str {
            "canned"
        }

        fn scale(&self) -> SeverityScale {
            SeverityScale::OneIsMostSevere
        }

        fn scope(&self) -> String {
            "rg-test".to_string()
        }

        fn reproduce_hint(&self) -> String {
            "az thing list -g rg-test".to_string()
        }

        async fn collect(&self, _collector: &Collector) -> Result<Vec<ResourceSample>, TriageError> {
            if self.fail {
                return Err(TriageError::Authentication("Please run 'az login'".into()));
            }
            Ok(self.samples.clone())
        }

        fn classify(&self, _samples: &[ResourceSample]) -> Vec<Issue> {
            self.issues.clone()
        }
    }

    fn sample() -> ResourceSample {
        ResourceSample::new("rg-test/plan-a", "plan-a", ResourceKind::AppServicePlan)
            .with_metric("cpu_percent", 91.0)
    }

    fn issue() -> Issue {
        Issue {
            title: "High CPU usage on App Service Plan `plan-a`".into(),
            severity: Severity::level(2),
            expected: "CPU below 80%".into(),
            actual: "CPU at 91%".into(),
            reproduce_hint: "az monitor metrics list".into(),
            next_steps: "Scale out".into(),
            details: None,
            resource_id: "rg-test/plan-a".into(),
            rule: "high_cpu".into(),
            correlation_key: None,
        }
    }

    fn collector() -> Collector {
        Collector::new(Arc::new(MockRunner::new()))
    }

    fn read_issues(reporter: &Reporter) -> Vec<Issue> {
        let text = std::fs::read_to_string(reporter.issues_path("canned")).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_run_writes_all_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path());
        let bundle = Canned {
            samples: vec![sample()],
            issues: vec![issue()],
            fail: false,
        };

        let run = run_bundle(&bundle, &collector(), &reporter, &RunOptions::default())
            .await
            .unwrap();

        assert_eq!(run.report.summary.status, ResourceStatus::Unhealthy);
        assert_eq!(read_issues(&reporter), vec![issue()]);

        let report = std::fs::read_to_string(&run.files.report).unwrap();
        assert!(report.contains("plan-a"));

        let metrics = std::fs::read_to_string(&run.files.metrics).unwrap();
        assert!(metrics.contains("triage_samples_collected_total"));
        assert!(metrics.contains("severity=\"2\""));
    }

    #[tokio::test]
    async fn test_no_issues_writes_empty_feed() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path());
        let bundle = Canned {
            samples: vec![sample()],
            issues: vec![],
            fail: false,
        };

        let run = run_bundle(&bundle, &collector(), &reporter, &RunOptions::default())
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&run.files.issues).unwrap();
        assert_eq!(raw.trim(), "[]");
        assert_eq!(run.report.summary.status, ResourceStatus::Healthy);
    }

    #[tokio::test]
    async fn test_healthy_marker_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path());
        let bundle = Canned {
            samples: vec![sample()],
            issues: vec![],
            fail: false,
        };
        let options = RunOptions {
            emit_healthy_issue: true,
        };

        let run = run_bundle(&bundle, &collector(), &reporter, &options).await.unwrap();

        let written = read_issues(&reporter);
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].rule, HEALTHY_RULE);
        assert_eq!(written[0].severity, Severity::level(4));
        assert_eq!(run.report.summary.total_issues, 0);
    }

    #[tokio::test]
    async fn test_fatal_error_resets_feed() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path());
        reporter.write_issues("canned", &[issue()]).unwrap();
        let bundle = Canned {
            samples: vec![],
            issues: vec![],
            fail: true,
        };

        let err = run_bundle(&bundle, &collector(), &reporter, &RunOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, TriageError::Authentication(_)));
        assert!(read_issues(&reporter).is_empty());
        assert!(!reporter.report_path("canned").exists());
    }
}
