//! Core data models for the triage pipeline

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of resource a sample describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    AppServicePlan,
    AksCluster,
    NodePool,
    AgentPool,
    Organization,
    Ingress,
    IstioComponent,
    IstioProxy,
    ActivityLogEvent,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::AppServicePlan => "App Service Plan",
            ResourceKind::AksCluster => "AKS Cluster",
            ResourceKind::NodePool => "Node Pool",
            ResourceKind::AgentPool => "Agent Pool",
            ResourceKind::Organization => "Organization",
            ResourceKind::Ingress => "Ingress",
            ResourceKind::IstioComponent => "Istio Component",
            ResourceKind::IstioProxy => "Istio Proxy",
            ResourceKind::ActivityLogEvent => "Activity Log Event",
        };
        f.write_str(name)
    }
}

/// A single observation of one monitored resource.
///
/// Metrics that could not be retrieved are absent from `metrics`; a zero
/// in the map always means the source actually reported zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub resource_id: String,
    pub resource_name: String,
    pub resource_kind: ResourceKind,
    pub metrics: BTreeMap<String, f64>,
    pub raw_status: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub correlation_key: Option<String>,
    /// Command that produced this sample, re-runnable by a human
    pub source_command: String,
    /// Set when collection for this resource failed
    pub collection_error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log_lines: Vec<String>,
    pub observed_at: DateTime<Utc>,
}

impl ResourceSample {
    /// Create an empty sample observed now
    pub fn new(
        resource_id: impl Into<String>,
        resource_name: impl Into<String>,
        resource_kind: ResourceKind,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_name: resource_name.into(),
            resource_kind,
            metrics: BTreeMap::new(),
            raw_status: None,
            attributes: BTreeMap::new(),
            correlation_key: None,
            source_command: String::new(),
            collection_error: None,
            log_lines: Vec::new(),
            observed_at: Utc::now(),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Record a metric only when the source produced one
    pub fn with_optional_metric(self, name: impl Into<String>, value: Option<f64>) -> Self {
        match value {
            Some(v) => self.with_metric(name, v),
            None => self,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.raw_status = Some(status.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_correlation_key(mut self, key: impl Into<String>) -> Self {
        self.correlation_key = Some(key.into());
        self
    }

    pub fn with_source_command(mut self, command: impl Into<String>) -> Self {
        self.source_command = command.into();
        self
    }

    pub fn with_collection_error(mut self, error: impl Into<String>) -> Self {
        self.collection_error = Some(error.into());
        self
    }

    /// Record one failed query against this resource; several failures
    /// accumulate on a single line as `query: reason; query: reason`.
    pub fn with_failed_query(mut self, query: &str, stderr: &str) -> Self {
        let reason = stderr.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("no output");
        let entry = format!("{}: {}", query, reason);
        self.collection_error = Some(match self.collection_error.take() {
            Some(existing) => format!("{}; {}", existing, entry),
            None => entry,
        });
        self
    }

    pub fn with_log_lines(mut self, lines: Vec<String>) -> Self {
        self.log_lines = lines;
        self
    }

    /// Override the observation time; callers pass `None` when the source
    /// omitted a timestamp and the collection time stands.
    pub fn observed(mut self, at: Option<DateTime<Utc>>) -> Self {
        if let Some(at) = at {
            self.observed_at = at;
        }
        self
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn is_degraded(&self) -> bool {
        self.collection_error.is_some()
    }
}

/// Issue severity, 1 through 4.
///
/// Whether 1 or 4 is the most urgent depends on the bundle; see
/// [`SeverityScale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Severity(u8);

impl Severity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;

    pub fn new(level: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&level).then_some(Self(level))
    }

    /// Construct from a literal known to be in range
    pub const fn level(level: u8) -> Self {
        assert!(level >= Self::MIN && level <= Self::MAX);
        Self(level)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Severity::new(value).ok_or_else(|| format!("severity {} outside 1..=4", value))
    }
}

impl From<Severity> for u8 {
    fn from(s: Severity) -> u8 {
        s.0
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which end of the 1..=4 range is the most urgent for a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityScale {
    /// 1 = critical, 4 = informational
    OneIsMostSevere,
    /// 4 = critical, 1 = informational
    FourIsMostSevere,
}

impl SeverityScale {
    /// The more urgent of two severities under this scale
    pub fn most_severe(self, a: Severity, b: Severity) -> Severity {
        match self {
            SeverityScale::OneIsMostSevere => a.min(b),
            SeverityScale::FourIsMostSevere => a.max(b),
        }
    }

    /// Most urgent severity in this scale
    pub fn critical(self) -> Severity {
        match self {
            SeverityScale::OneIsMostSevere => Severity(1),
            SeverityScale::FourIsMostSevere => Severity(4),
        }
    }

    /// Least urgent severity in this scale
    pub fn informational(self) -> Severity {
        match self {
            SeverityScale::OneIsMostSevere => Severity(4),
            SeverityScale::FourIsMostSevere => Severity(1),
        }
    }

    /// Normalized urgency rank, 0 = informational, 3 = critical
    pub fn urgency(self, severity: Severity) -> u8 {
        match self {
            SeverityScale::OneIsMostSevere => Severity::MAX - severity.0,
            SeverityScale::FourIsMostSevere => severity.0 - Severity::MIN,
        }
    }
}

/// A structured finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub title: String,
    pub severity: Severity,
    pub expected: String,
    pub actual: String,
    pub reproduce_hint: String,
    pub next_steps: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Resource the issue is attributed to
    pub resource_id: String,
    /// Rule that fired
    pub rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_key: Option<String>,
}
