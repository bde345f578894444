//! Correlation-key deduplication

use std::collections::HashSet;

use crate::models::Issue;

#[derive(Debug, PartialEq, Eq, Hash)]
struct DedupKey {
    rule: String,
    correlation_key: String,
}

/// Keep the first issue per `(rule, correlation_key)`. Issues without a
/// correlation key always pass through.
pub fn dedupe_by_correlation(issues: Vec<Issue>) -> Vec<Issue> {
    let mut seen = HashSet::new();
    issues
        .into_iter()
        .filter(|issue| match &issue.correlation_key {
            Some(key) => seen.insert(DedupKey {
                rule: issue.rule.clone(),
                correlation_key: key.clone(),
            }),
            None => true,
        })
        .collect()
}
