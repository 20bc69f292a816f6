//! Report output: a CSV file for archiving and a colored table for the console.

use crate::aggregator::SessionReport;
use crate::error::ReportError;
use crate::model::Status;
use crossterm::style::{Color, Stylize};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Writes one CSV row per case, with a header row.
pub fn write_csv<W: Write>(report: &SessionReport, writer: W) -> Result<(), ReportError> {
    let mut csv = csv::Writer::from_writer(writer);
    for record in report.records() {
        csv.serialize(record)?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes the CSV report to `path`, creating parent directories as needed.
pub fn write_csv_file(report: &SessionReport, path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    write_csv(report, File::create(path)?)
}

fn status_color(status: Status) -> Color {
    match status {
        Status::Pass => Color::Green,
        Status::Fail => Color::Red,
        Status::Timeout | Status::Error => Color::Yellow,
        Status::NotRun => Color::DarkGrey,
    }
}

fn fmt_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{}", v))
}

/// Renders the report as a fixed-width table followed by the summary.
pub fn render_table(report: &SessionReport, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<16} {:>12} {:>12} {:>12} {:>9} {:<8} {:>8}",
        "Case", "Sent", "Expected", "Received", "Error (%)", "Status", "Attempts"
    );

    for rec in report.records() {
        let error = rec
            .error_percent
            .map_or_else(|| "-".to_string(), |e| format!("{:.2}", e));
        let status = format!("{:<8}", rec.status.as_str());
        let status = if color {
            status.with(status_color(rec.status)).to_string()
        } else {
            status
        };
        let _ = writeln!(
            out,
            "{:<16} {:>12} {:>12} {:>12} {:>9} {} {:>8}",
            rec.case_id,
            rec.sent,
            rec.expected,
            fmt_value(rec.received),
            error,
            status,
            rec.attempts
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", report.summary());
    if let Some(reason) = report.abort_reason() {
        let line = format!("Session aborted: {}", reason);
        let line = if color {
            line.red().bold().to_string()
        } else {
            line
        };
        let _ = writeln!(out, "{}", line);
    }
    out
}
