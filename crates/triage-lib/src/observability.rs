//! Run metrics and structured logging
//!
//! Provides:
//! - Prometheus metrics for one bundle run, kept in a per-run registry and
//!   written out in text exposition format next to the issue feed
//! - Structured JSON logging with tracing

use std::collections::HashMap;

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tracing::{debug, info, warn};

use crate::error::TriageError;
use crate::models::{Issue, ResourceSample, SeverityScale};
use crate::reporter::RunSummary;

/// Metric name prefix
const NAMESPACE: &str = "triage";

/// Run duration buckets (in seconds); vendor CLIs dominate
const DURATION_BUCKETS: &[f64] = &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0];

/// Metrics for a single bundle run
#[derive(Clone)]
pub struct RunMetrics {
    registry: Registry,
    samples_collected: IntCounter,
    samples_degraded: IntCounter,
    issues: IntCounterVec,
    run_duration_seconds: Histogram,
    last_run_timestamp: IntGauge,
}

impl RunMetrics {
    /// Create a registry whose series all carry `bundle="<bundle>"`
    pub fn new(bundle: &str) -> Result<Self, TriageError> {
        let labels = HashMap::from([("bundle".to_string(), bundle.to_string())]);
        let registry = Registry::new_custom(Some(NAMESPACE.to_string()), Some(labels))?;

        let samples_collected = IntCounter::new(
            "samples_collected_total",
            "Resource samples produced by the collector",
        )?;
        let samples_degraded = IntCounter::new(
            "samples_degraded_total",
            "Resource samples whose collection failed",
        )?;
        let issues = IntCounterVec::new(
            Opts::new("issues_total", "Issues emitted, by severity"),
            &["severity"],
        )?;
        let run_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("run_duration_seconds", "Wall-clock time of the bundle run")
                .buckets(DURATION_BUCKETS.to_vec()),
        )?;
        let last_run_timestamp = IntGauge::new(
            "last_run_timestamp_seconds",
            "Unix time at which the run finished",
        )?;

        registry.register(Box::new(samples_collected.clone()))?;
        registry.register(Box::new(samples_degraded.clone()))?;
        registry.register(Box::new(issues.clone()))?;
        registry.register(Box::new(run_duration_seconds.clone()))?;
        registry.register(Box::new(last_run_timestamp.clone()))?;

        Ok(Self {
            registry,
            samples_collected,
            samples_degraded,
            issues,
            run_duration_seconds,
            last_run_timestamp,
        })
    }

    pub fn record_samples(&self, samples: &[ResourceSample]) {
        self.samples_collected.inc_by(samples.len() as u64);
        self.samples_degraded
            .inc_by(samples.iter().filter(|s| s.is_degraded()).count() as u64);
    }

    pub fn record_issues(&self, issues: &[Issue]) {
        for issue in issues {
            let severity = issue.severity.to_string();
            self.issues.with_label_values(&[severity.as_str()]).inc();
        }
    }

    pub fn observe_run_duration(&self, duration_secs: f64) {
        self.run_duration_seconds.observe(duration_secs);
    }

    pub fn set_finished_at(&self, unix_secs: i64) {
        self.last_run_timestamp.set(unix_secs);
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String, TriageError> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }
}

/// Structured logger for run lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    bundle: String,
}

impl StructuredLogger {
    pub fn new(bundle: impl Into<String>) -> Self {
        Self {
            bundle: bundle.into(),
        }
    }

    pub fn log_run_started(&self, scope: &str) {
        info!(
            event = "run_started",
            bundle = %self.bundle,
            scope = %scope,
            "Bundle run started"
        );
    }

    pub fn log_collected(&self, samples: &[ResourceSample]) {
        for sample in samples {
            match &sample.collection_error {
                Some(error) => warn!(
                    event = "sample_degraded",
                    bundle = %self.bundle,
                    resource_id = %sample.resource_id,
                    resource_kind = %sample.resource_kind,
                    error = %error,
                    "Could not collect resource"
                ),
                None => debug!(
                    event = "sample_collected",
                    bundle = %self.bundle,
                    resource_id = %sample.resource_id,
                    resource_kind = %sample.resource_kind,
                    metrics = sample.metrics.len(),
                    "Collected resource sample"
                ),
            }
        }
        info!(
            event = "collection_finished",
            bundle = %self.bundle,
            samples = samples.len(),
            "Collection finished"
        );
    }

    pub fn log_issue(&self, issue: &Issue, scale: SeverityScale) {
        if issue.severity == scale.critical() {
            warn!(
                event = "issue_raised",
                bundle = %self.bundle,
                rule = %issue.rule,
                resource_id = %issue.resource_id,
                severity = issue.severity.value(),
                title = %issue.title,
                "Critical issue raised"
            );
        } else {
            info!(
                event = "issue_raised",
                bundle = %self.bundle,
                rule = %issue.rule,
                resource_id = %issue.resource_id,
                severity = issue.severity.value(),
                title = %issue.title,
                "Issue raised"
            );
        }
    }

    pub fn log_run_finished(&self, summary: &RunSummary, duration_secs: f64) {
        info!(
            event = "run_finished",
            bundle = %self.bundle,
            status = %summary.status,
            resources = summary.resources.len(),
            issues = summary.total_issues,
            duration_secs = duration_secs,
            "Bundle run finished"
        );
    }

    pub fn log_run_failed(&self, error: &TriageError) {
        warn!(
            event = "run_failed",
            bundle = %self.bundle,
            error = %error,
            "Bundle run aborted"
        );
    }
}
