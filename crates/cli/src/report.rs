//! Result table and JSON summary

use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

use framewatch_core::application::ExtractionError;
use framewatch_core::domain::ExtractionOutcome;

#[derive(Debug, Serialize, Tabled)]
pub struct ReportRow {
    pub input: String,
    pub status: String,
    pub frames: usize,
    #[tabled(display_with = "display_exit_code")]
    pub exit_code: Option<i32>,
    #[tabled(display_with = "display_duration")]
    pub duration_ms: Option<u64>,
    #[tabled(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[tabled(skip)]
    #[serde(skip)]
    pub succeeded: bool,
}

fn display_exit_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())
}

fn display_duration(ms: &Option<u64>) -> String {
    ms.map(|ms| format!("{:.1}s", ms as f64 / 1000.0))
        .unwrap_or_else(|| "-".to_string())
}

impl ReportRow {
    pub fn from_result(input: &str, result: &Result<ExtractionOutcome, ExtractionError>) -> Self {
        match result {
            Ok(outcome) => Self {
                input: input.to_string(),
                status: if outcome.exited_cleanly() {
                    "completed".to_string()
                } else {
                    "exited with error".to_string()
                },
                frames: outcome.frames,
                exit_code: Some(outcome.exit_code),
                duration_ms: Some(outcome.duration_ms),
                error: None,
                succeeded: outcome.exited_cleanly(),
            },
            Err(e) => {
                let (status, exit_code) = match e {
                    ExtractionError::ToolFailed { exit_code, .. } => ("stalled", Some(*exit_code)),
                    ExtractionError::Cancelled { .. } => ("cancelled", None),
                    ExtractionError::Launch(_) => ("launch failed", None),
                    ExtractionError::InvalidRequest(_) => ("invalid", None),
                    ExtractionError::AdmissionClosed => ("not admitted", None),
                };
                Self {
                    input: input.to_string(),
                    status: status.to_string(),
                    frames: 0,
                    exit_code,
                    duration_ms: None,
                    error: Some(e.to_string()),
                    succeeded: false,
                }
            }
        }
    }
}

pub fn print_table(rows: &[ReportRow]) {
    println!("{}", Table::new(rows));

    let failed: Vec<&ReportRow> = rows.iter().filter(|r| !r.succeeded).collect();
    println!();
    if failed.is_empty() {
        println!(
            "{}",
            format!("✓ {} extraction(s) completed", rows.len()).green().bold()
        );
    } else {
        println!(
            "{}",
            format!("✗ {} of {} extraction(s) failed", failed.len(), rows.len())
                .red()
                .bold()
        );
        for row in failed {
            if let Some(error) = &row.error {
                println!("  {}: {}", row.input.yellow(), error);
            }
        }
    }
}

pub fn print_json(rows: &[ReportRow]) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(rows)?);
    Ok(())
}
