//! Plain-text companion report

use std::fmt::Write;

use tabled::{settings::Style, Table, Tabled};

use super::RunReport;
use crate::classifier::format_number;
use crate::models::SeverityScale;

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Resource")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Worst Severity")]
    worst: String,
    #[tabled(rename = "Issues")]
    issues: usize,
    #[tabled(rename = "Metrics")]
    metrics: String,
}

#[derive(Tabled)]
struct IssueRow {
    #[tabled(rename = "Sev")]
    severity: u8,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Resource")]
    resource: String,
}

fn scale_label(scale: SeverityScale) -> &'static str {
    match scale {
        SeverityScale::OneIsMostSevere => "1 = most severe",
        SeverityScale::FourIsMostSevere => "4 = most severe",
    }
}

pub fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    let summary = &report.summary;

    // write! into a String cannot fail
    let _ = writeln!(out, "Triage report: {}", report.bundle);
    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(out, "Scope:       {}", report.scope);
    let _ = writeln!(out, "Generated:   {}", report.finished_at.to_rfc3339());
    let _ = writeln!(
        out,
        "Duration:    {:.1}s",
        (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0
    );
    let _ = writeln!(out, "Severity:    {}", scale_label(report.scale));
    let _ = writeln!(out, "Status:      {}", summary.status);
    let _ = writeln!(
        out,
        "Resources:   {} ({} with issues)",
        summary.resources.len(),
        summary.resources_with_issues()
    );
    let _ = writeln!(out, "Issues:      {}", summary.total_issues);
    out.push('\n');

    let rows: Vec<ResourceRow> = summary
        .resources
        .iter()
        .map(|r| {
            let sample = report.samples.iter().find(|s| s.resource_id == r.resource_id);
            ResourceRow {
                name: r.resource_name.clone(),
                kind: r.resource_kind.map(|k| k.to_string()).unwrap_or_default(),
                status: r.status.to_string(),
                worst: r.worst_severity.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
                issues: r.issue_count,
                metrics: sample
                    .map(|s| {
                        s.metrics
                            .iter()
                            .map(|(k, v)| format!("{}={}", k, format_number(*v)))
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default(),
            }
        })
        .collect();

    if rows.is_empty() {
        out.push_str("No resources found\n");
    } else {
        out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
        out.push('\n');
    }

    if report.issues.is_empty() {
        out.push_str("\nNo issues found\n");
        return out;
    }

    let issue_rows: Vec<IssueRow> = report
        .issues
        .iter()
        .map(|i| IssueRow {
            severity: i.severity.value(),
            title: i.title.clone(),
            resource: i.resource_id.clone(),
        })
        .collect();
    out.push('\n');
    out.push_str(&Table::new(issue_rows).with(Style::rounded()).to_string());
    out.push_str("\n\n");

    for (n, issue) in report.issues.iter().enumerate() {
        let _ = writeln!(out, "[{}] {} (severity {})", n + 1, issue.title, issue.severity);
        let _ = writeln!(out, "    Expected:   {}", issue.expected);
        let _ = writeln!(out, "    Actual:     {}", issue.actual);
        let _ = writeln!(out, "    Next steps: {}", issue.next_steps);
        if !issue.reproduce_hint.is_empty() {
            let _ = writeln!(out, "    Reproduce:  {}", issue.reproduce_hint);
        }
        out.push('\n');
    }
    out
}
