//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};
use triage_lib::{ResourceStatus, Severity, SeverityScale};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat, empty: &str) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", empty.green());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&items) {
                println!("{}", json);
            }
        }
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color a run or resource status
pub fn color_status(status: ResourceStatus) -> String {
    let text = status.to_string();
    match status {
        ResourceStatus::Healthy => text.green().to_string(),
        ResourceStatus::Degraded => text.yellow().to_string(),
        ResourceStatus::Unhealthy => text.red().to_string(),
    }
}

/// Color a severity by its urgency under the bundle's scale
pub fn color_severity(severity: Severity, scale: SeverityScale) -> String {
    let text = severity.to_string();
    match scale.urgency(severity) {
        3 => text.red().bold().to_string(),
        2 => text.red().to_string(),
        1 => text.yellow().to_string(),
        _ => text.blue().to_string(),
    }
}
