//! `istioctl` text output and istio-proxy samples

use chrono::{DateTime, Utc};

use super::kubernetes::TopRow;
use super::metric;
use super::units::percent_of;
use crate::collector::Collected;
use crate::models::{ResourceKind, ResourceSample};

pub const PROXY_CONTAINER: &str = "istio-proxy";

/// One row of `istioctl proxy-config secret <pod>`
#[derive(Debug, Clone, PartialEq)]
pub struct SecretRow {
    pub name: String,
    pub cert_type: String,
    pub status: String,
    pub valid: bool,
    pub not_after: Option<DateTime<Utc>>,
}

/// Parse the secret table. Columns are separated by runs of two or more
/// spaces because `TYPE` values ("Cert Chain") contain single spaces.
pub fn parse_secret_table(text: &str) -> Vec<SecretRow> {
    text.lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with("RESOURCE NAME"))
        .filter_map(|line| {
            let cols: Vec<&str> = line
                .split("  ")
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .collect();
            if cols.len() < 6 {
                return None;
            }
            let not_after = cols[cols.len() - 2];
            Some(SecretRow {
                name: cols[0].to_string(),
                cert_type: cols[1].to_string(),
                status: cols[2].to_string(),
                valid: cols[3].eq_ignore_ascii_case("true"),
                not_after: DateTime::parse_from_rfc3339(not_after)
                    .ok()
                    .map(|d| d.with_timezone(&Utc)),
            })
        })
        .collect()
}

/// Everything gathered for one sidecar
#[derive(Debug, Clone)]
pub struct ProxyObservation {
    pub namespace: String,
    pub pod: String,
    pub usage: Option<TopRow>,
    /// (millicores, Mi)
    pub limits: (Option<f64>, Option<f64>),
    pub secrets: Collected<Vec<SecretRow>>,
    pub log_lines: Vec<String>,
}

/// Fold one sidecar's usage, limits, certificates and logs into a sample.
///
/// Usage percentages need both a `kubectl top` row and a limit; either
/// missing leaves the metric absent. Certificate expiry is the earliest
/// `not_after` across active rows, in hours from `now` (negative once
/// expired).
pub fn proxy_sample(obs: ProxyObservation, now: DateTime<Utc>, command: &str) -> ResourceSample {
    let (cpu_limit, memory_limit) = obs.limits;
    let cpu = obs.usage.as_ref().and_then(|u| u.cpu_millicores);
    let memory = obs.usage.as_ref().and_then(|u| u.memory_mi);

    let mut sample = ResourceSample::new(
        format!("{}/{}", obs.namespace, obs.pod),
        &obs.pod,
        ResourceKind::IstioProxy,
    )
    .with_source_command(command)
    .with_optional_metric(metric::CPU_MILLICORES, cpu)
    .with_optional_metric(metric::MEMORY_MI, memory)
    .with_optional_metric(
        metric::CPU_PERCENT,
        cpu.zip(cpu_limit).and_then(|(used, limit)| percent_of(used, limit)),
    )
    .with_optional_metric(
        metric::MEMORY_PERCENT,
        memory.zip(memory_limit).and_then(|(used, limit)| percent_of(used, limit)),
    )
    .with_log_lines(obs.log_lines);

    match obs.secrets {
        Collected::Payload(rows) => {
            let invalid = rows.iter().filter(|r| !r.valid).count();
            let earliest = rows
                .iter()
                .filter(|r| r.status.eq_ignore_ascii_case("ACTIVE"))
                .filter_map(|r| r.not_after)
                .min();
            sample = sample
                .with_metric(metric::INVALID_CERTS, invalid as f64)
                .with_optional_metric(
                    metric::CERT_EXPIRY_HOURS,
                    earliest.map(|t| (t - now).num_minutes() as f64 / 60.0),
                );
            if let Some(t) = earliest {
                sample = sample.with_attribute("cert_not_after", t.to_rfc3339());
            }
        }
        Collected::Failed { stderr } => {
            sample = sample.with_failed_query("istioctl proxy-config secret", &stderr);
        }
    }
    sample
}
