//! Samples -> issues
//!
//! Rules are static data declared by each bundle. Evaluation is pure:
//! every rule is checked against every applicable sample, nothing is
//! short-circuited, and a resource may raise several issues at once.

mod dedup;
mod engine;
pub mod patterns;
pub mod recommend;
mod rule;


pub use dedup::dedupe_by_correlation;
pub use engine::{Classifier, DegradedRule, COLLECTION_FAILED_RULE};
pub use patterns::{load_patterns, scan_logs, PatternRule};
pub use recommend::{primary_recommendation, Recommendation};
pub use rule::{
    format_number, ClassificationRule, Comparator, Condition, Interpolation, IssueTemplate,
    Observation, Operand, Subject,
};
