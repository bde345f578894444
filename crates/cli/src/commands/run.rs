//! Bundle execution and the terminal summary

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;
use triage_lib::{
    BundleKind, BundleRun, CliRunner, Collector, Issue, Reporter, RunOptions, Settings,
    SeverityScale,
};

use crate::output::{
    color_severity, color_status, print_info, print_success, print_table, print_warning,
    OutputFormat,
};

/// Row for the issue table
#[derive(Tabled, Serialize)]
struct IssueRow {
    #[tabled(rename = "Sev")]
    severity: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Resource")]
    resource: String,
}

impl IssueRow {
    fn from_issue(issue: &Issue, scale: SeverityScale) -> Self {
        Self {
            severity: color_severity(issue.severity, scale),
            title: issue.title.clone(),
            resource: issue.resource_id.clone(),
        }
    }
}

/// Run one bundle with the production CLI runner
pub async fn run_bundle(
    kind: BundleKind,
    settings: &Settings,
    output_dir: &Path,
    options: &RunOptions,
    format: OutputFormat,
) -> Result<()> {
    let bundle = kind.build(settings)?;
    let collector = Collector::new(Arc::new(CliRunner::new(settings.command_timeout())));
    let reporter = Reporter::new(output_dir);

    let run = triage_lib::run_bundle(bundle.as_ref(), &collector, &reporter, options)
        .await
        .with_context(|| format!("Bundle '{}' failed", kind))?;

    print_run(&run, format)
}

fn print_run(run: &BundleRun, format: OutputFormat) -> Result<()> {
    let report = &run.report;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&report.issues)?);
        return Ok(());
    }

    println!("{}", format!("Triage: {}", report.bundle).bold());
    println!("{}", "=".repeat(50));
    println!("Scope:                  {}", report.scope.cyan());
    println!("Resources:              {}", report.summary.resources.len());
    println!("Status:                 {}", color_status(report.summary.status));
    println!();

    let rows: Vec<IssueRow> = report
        .issues
        .iter()
        .map(|issue| IssueRow::from_issue(issue, report.scale))
        .collect();
    print_table(&rows, format, "No issues found");
    println!();

    if report.summary.total_issues > 0 {
        print_warning(&format!(
            "{} issue(s) across {} resource(s)",
            report.summary.total_issues,
            report.summary.resources_with_issues()
        ));
    } else {
        print_success("All checks passed");
    }
    print_info(&format!("Issues:  {}", run.files.issues.display()));
    print_info(&format!("Report:  {}", run.files.report.display()));
    print_info(&format!("Metrics: {}", run.files.metrics.display()));
    Ok(())
}
