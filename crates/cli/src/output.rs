//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use squirrly_lib::sink::Notice;
use squirrly_lib::{RunReport, RunStatus, StageStatus};
use tabled::{settings::Style, Table, Tabled};

/// Output format for the run report
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

#[derive(Tabled)]
struct StageRow {
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Details")]
    details: String,
}

/// Print the end-of-run report to stderr so it never mixes with results
pub fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let rows: Vec<StageRow> = report
                .stages
                .iter()
                .map(|outcome| StageRow {
                    stage: outcome.stage.to_string(),
                    status: color_stage(outcome.status),
                    details: outcome.message.clone().unwrap_or_default(),
                })
                .collect();
            eprintln!("{}", Table::new(rows).with(Style::rounded()));

            if let Some(artifact) = &report.artifact {
                eprintln!(
                    "Artifact: {} on {} ({})",
                    artifact.path,
                    artifact.host_worker,
                    format_bytes(artifact.size_bytes)
                );
            }
            eprintln!("Status: {}", color_run(report.status()));
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(report) {
                eprintln!("{}", json);
            }
        }
    }
}

/// Colored rendering of sink notices for terminal delivery
pub fn style_notice(notice: Notice, message: &str) -> String {
    match notice {
        Notice::Info => format!("{} {}", "ℹ".blue().bold(), message),
        Notice::Success => format!("{} {}", "✓".green().bold(), message),
        Notice::Warning => format!("{} {}", "⚠".yellow().bold(), message),
        Notice::Error => format!("{} {}", "✗".red().bold(), message),
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{}", style_notice(Notice::Success, message));
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{}", style_notice(Notice::Error, message));
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{}", style_notice(Notice::Warning, message));
}

/// Print an info message
pub fn print_info(message: &str) {
    eprintln!("{}", style_notice(Notice::Info, message));
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2}Mi", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}Ki", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

fn color_stage(status: StageStatus) -> String {
    let label = status.to_string();
    match status {
        StageStatus::Succeeded => label.green().to_string(),
        StageStatus::Degraded | StageStatus::Skipped => label.yellow().to_string(),
        StageStatus::Failed => label.red().to_string(),
    }
}

fn color_run(status: RunStatus) -> String {
    let label = status.to_string();
    match status {
        RunStatus::Success => label.green().bold().to_string(),
        RunStatus::Degraded => label.yellow().bold().to_string(),
        RunStatus::Failed => label.red().bold().to_string(),
    }
}
