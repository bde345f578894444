//! Known-error scanning over raw log lines

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::TriageError;
use crate::models::{Issue, ResourceSample, Severity};
use crate::normalizer::timestamps::extract_timestamp;

/// Default istio-proxy error list
pub const DEFAULT_ISTIO_PROXY_ERRORS: &str = include_str!("../../data/istio_proxy_errors.json");

/// Literal substring mapped to a finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    pub pattern: String,
    pub severity: Severity,
    pub title: String,
    #[serde(default)]
    pub next_steps: String,
}

pub fn parse_patterns(json: &str) -> Result<Vec<PatternRule>, TriageError> {
    let patterns: Vec<PatternRule> = serde_json::from_str(json)
        .map_err(|e| TriageError::InvalidConfig(format!("error pattern list: {}", e)))?;
    if let Some(empty) = patterns.iter().position(|p| p.pattern.is_empty()) {
        return Err(TriageError::InvalidConfig(format!(
            "error pattern list: entry {} has an empty pattern",
            empty
        )));
    }
    Ok(patterns)
}

/// Load the override file when given, the embedded list otherwise
pub fn load_patterns(path: Option<&Path>) -> Result<Vec<PatternRule>, TriageError> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                TriageError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
            })?;
            parse_patterns(&text)
        }
        None => parse_patterns(DEFAULT_ISTIO_PROXY_ERRORS),
    }
}

#[derive(Debug)]
struct Hits<'a> {
    count: usize,
    first_line: &'a str,
    first_seen: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
}

/// One issue per (resource, pattern) found in `sample.log_lines`.
///
/// Each line counts toward the first pattern it contains only. Issues come
/// out in pattern declaration order.
pub fn scan_logs(sample: &ResourceSample, patterns: &[PatternRule]) -> Vec<Issue> {
    let mut hits: BTreeMap<usize, Hits<'_>> = BTreeMap::new();

    for line in &sample.log_lines {
        let Some(idx) = patterns.iter().position(|p| line.contains(p.pattern.as_str())) else {
            continue;
        };
        let seen = extract_timestamp(line, sample.observed_at);
        let entry = hits.entry(idx).or_insert(Hits {
            count: 0,
            first_line: line,
            first_seen: None,
            last_seen: None,
        });
        entry.count += 1;
        if let Some(ts) = seen {
            entry.first_seen = Some(entry.first_seen.map_or(ts, |f| f.min(ts)));
            entry.last_seen = Some(entry.last_seen.map_or(ts, |l| l.max(ts)));
        }
    }

    hits.into_iter()
        .map(|(idx, hit)| {
            let pattern = &patterns[idx];
            Issue {
                title: format!("{} in `{}`", pattern.title, sample.resource_name),
                severity: pattern.severity,
                expected: format!("No `{}` entries in logs of `{}`", pattern.pattern, sample.resource_name),
                actual: format!(
                    "`{}` seen {} time(s) in logs of `{}`",
                    pattern.pattern, hit.count, sample.resource_name
                ),
                reproduce_hint: sample.source_command.clone(),
                next_steps: pattern.next_steps.clone(),
                details: Some(json!({
                    "pattern": pattern.pattern,
                    "occurrences": hit.count,
                    "first_seen": hit.first_seen.map(|t| t.to_rfc3339()),
                    "last_seen": hit.last_seen.map(|t| t.to_rfc3339()),
                    "sample_line": hit.first_line,
                })),
                resource_id: sample.resource_id.clone(),
                rule: format!("log_pattern:{}", pattern.pattern),
                correlation_key: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceKind;

    #[test]
    fn test_embedded_list_parses() {
        let patterns = load_patterns(None).unwrap();
        assert!(patterns.iter().any(|p| p.pattern == "upstream connect error"));
    }

    #[test]
    fn test_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.json");
        std::fs::write(&path, r#"[{"pattern": "boom", "severity": 1, "title": "Boom"}]"#).unwrap();

        let patterns = load_patterns(Some(&path)).unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].next_steps, "");
    }

    #[test]
    fn test_invalid_pattern_file_is_config_error() {
        assert!(matches!(parse_patterns("{}"), Err(TriageError::InvalidConfig(_))));
        assert!(matches!(
            parse_patterns(r#"[{"pattern": "", "severity": 2, "title": "x"}]"#),
            Err(TriageError::InvalidConfig(_))
        ));
        assert!(parse_patterns(r#"[{"pattern": "x", "severity": 9, "title": "x"}]"#).is_err());
    }

    #[test]
    fn test_first_matching_pattern_per_line() {
        let patterns = vec![
            PatternRule {
                pattern: "no healthy upstream".into(),
                severity: Severity::level(2),
                title: "No healthy upstream".into(),
                next_steps: String::new(),
            },
            PatternRule {
                pattern: "upstream".into(),
                severity: Severity::level(3),
                title: "Upstream".into(),
                next_steps: String::new(),
            },
        ];
        let sample = ResourceSample::new("shop/p", "p", ResourceKind::IstioProxy)
            .with_log_lines(vec!["503 no healthy upstream".into()]);

        let issues = scan_logs(&sample, &patterns);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule, "log_pattern:no healthy upstream");
    }

    #[test]
    fn test_occurrence_window_in_details() {
        let patterns = load_patterns(None).unwrap();
        let sample = ResourceSample::new("shop/p", "p", ResourceKind::IstioProxy).with_log_lines(vec![
            "[2024-05-01T10:00:00.000Z] \"GET /\" 503 UF upstream connect error".into(),
            "[2024-05-01T10:05:00.000Z] \"GET /\" 503 UF upstream connect error".into(),
        ]);

        let issues = scan_logs(&sample, &patterns);
        assert_eq!(issues.len(), 1);
        let details = issues[0].details.as_ref().unwrap();
        assert_eq!(details["occurrences"], 2);
        assert_eq!(details["first_seen"], "2024-05-01T10:00:00+00:00");
        assert_eq!(details["last_seen"], "2024-05-01T10:05:00+00:00");
    }
}
