//! Static rule definitions and condition evaluation

use crate::models::{ResourceKind, ResourceSample, Severity};

/// What part of a sample a condition looks at
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    Metric(String),
    Status,
    Attribute(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    GreaterThan,
    LessThan,
    Equal,
    NotEqual,
    Contains,
    NotContains,
    /// Subject absent from the sample
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Number(f64),
    Text(String),
    /// Another metric of the same sample
    Metric(String),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub subject: Subject,
    pub comparator: Comparator,
    pub operand: Operand,
}

/// Values captured from a holding condition, used for interpolation
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub value: String,
    pub threshold: String,
}

impl Subject {
    pub fn metric(name: &str) -> Self {
        Subject::Metric(name.to_string())
    }

    pub fn attribute(name: &str) -> Self {
        Subject::Attribute(name.to_string())
    }

    fn with(self, comparator: Comparator, operand: Operand) -> Condition {
        Condition {
            subject: self,
            comparator,
            operand,
        }
    }

    pub fn greater_than(self, threshold: f64) -> Condition {
        self.with(Comparator::GreaterThan, Operand::Number(threshold))
    }

    pub fn less_than(self, threshold: f64) -> Condition {
        self.with(Comparator::LessThan, Operand::Number(threshold))
    }

    pub fn equals(self, value: f64) -> Condition {
        self.with(Comparator::Equal, Operand::Number(value))
    }

    pub fn equals_metric(self, other: &str) -> Condition {
        self.with(Comparator::Equal, Operand::Metric(other.to_string()))
    }

    pub fn is(self, text: &str) -> Condition {
        self.with(Comparator::Equal, Operand::Text(text.to_string()))
    }

    pub fn is_not(self, text: &str) -> Condition {
        self.with(Comparator::NotEqual, Operand::Text(text.to_string()))
    }

    pub fn contains(self, text: &str) -> Condition {
        self.with(Comparator::Contains, Operand::Text(text.to_string()))
    }

    pub fn not_contains(self, text: &str) -> Condition {
        self.with(Comparator::NotContains, Operand::Text(text.to_string()))
    }

    pub fn missing(self) -> Condition {
        self.with(Comparator::Missing, Operand::None)
    }
}

enum Value<'a> {
    Number(f64),
    Text(&'a str),
}

impl Condition {
    /// Evaluate against a sample; `Some` when the condition holds.
    ///
    /// `>`/`<` are strict. An absent subject only ever satisfies
    /// [`Comparator::Missing`], so a metric with no data never fires a
    /// numeric rule and a missing status never fires a text rule.
    pub fn evaluate(&self, sample: &ResourceSample) -> Option<Observation> {
        let value = match &self.subject {
            Subject::Metric(name) => sample.metric(name).map(Value::Number),
            Subject::Status => sample.raw_status.as_deref().map(Value::Text),
            Subject::Attribute(name) => sample.attribute(name).map(Value::Text),
        };

        if self.comparator == Comparator::Missing {
            return value.is_none().then(|| Observation {
                value: "no data".to_string(),
                threshold: String::new(),
            });
        }

        match value? {
            Value::Number(v) => {
                let threshold = match &self.operand {
                    Operand::Number(t) => *t,
                    Operand::Metric(other) => sample.metric(other)?,
                    Operand::Text(_) | Operand::None => return None,
                };
                let holds = match self.comparator {
                    Comparator::GreaterThan => v > threshold,
                    Comparator::LessThan => v < threshold,
                    Comparator::Equal => v == threshold,
                    Comparator::NotEqual => v != threshold,
                    _ => false,
                };
                holds.then(|| Observation {
                    value: format_number(v),
                    threshold: format_number(threshold),
                })
            }
            Value::Text(text) => {
                let Operand::Text(expected) = &self.operand else {
                    return None;
                };
                let holds = match self.comparator {
                    Comparator::Equal => text.eq_ignore_ascii_case(expected),
                    Comparator::NotEqual => !text.eq_ignore_ascii_case(expected),
                    Comparator::Contains => text.contains(expected.as_str()),
                    Comparator::NotContains => !text.contains(expected.as_str()),
                    _ => false,
                };
                holds.then(|| Observation {
                    value: text.to_string(),
                    threshold: expected.clone(),
                })
            }
        }
    }
}

/// Render a number without trailing zeros: 85 -> "85", 33.333 -> "33.33"
pub fn format_number(v: f64) -> String {
    let s = format!("{:.2}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Issue text with `{resource}`, `{value}`, `{threshold}` and `{scope}`
/// placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct IssueTemplate {
    pub title: String,
    pub expected: String,
    pub actual: String,
    pub next_steps: String,
}

/// Values substituted into an [`IssueTemplate`]
#[derive(Debug, Clone, Default)]
pub struct Interpolation<'a> {
    pub resource: &'a str,
    pub value: &'a str,
    pub threshold: &'a str,
    pub scope: &'a str,
}

impl IssueTemplate {
    pub fn new(
        title: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
        next_steps: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            expected: expected.into(),
            actual: actual.into(),
            next_steps: next_steps.into(),
        }
    }

    pub fn render(&self, text: &str, vars: &Interpolation<'_>) -> String {
        text.replace("{resource}", vars.resource)
            .replace("{value}", vars.value)
            .replace("{threshold}", vars.threshold)
            .replace("{scope}", vars.scope)
    }
}

/// A threshold/status check mapped to a fixed severity
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub name: String,
    /// All must hold; the first supplies `{value}` and `{threshold}`
    pub conditions: Vec<Condition>,
    pub severity: Severity,
    pub template: IssueTemplate,
    /// Resource kinds the rule applies to; empty means all
    pub kinds: Vec<ResourceKind>,
}

impl ClassificationRule {
    pub fn new(
        name: impl Into<String>,
        condition: Condition,
        severity: Severity,
        template: IssueTemplate,
    ) -> Self {
        Self {
            name: name.into(),
            conditions: vec![condition],
            severity,
            template,
            kinds: Vec::new(),
        }
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn only_for(mut self, kind: ResourceKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn applies_to(&self, kind: ResourceKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }

    /// Whether any condition fires on absent data
    pub fn checks_absence(&self) -> bool {
        self.conditions.iter().any(|c| c.comparator == Comparator::Missing)
    }

    /// Observation of the first condition when every condition holds
    pub fn evaluate(&self, sample: &ResourceSample) -> Option<Observation> {
        if !self.applies_to(sample.resource_kind) {
            return None;
        }
        let mut first = None;
        for condition in &self.conditions {
            let observed = condition.evaluate(sample)?;
            first.get_or_insert(observed);
        }
        first
    }
}
