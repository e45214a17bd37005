//! Export of completion records, productivity reports and UI logs.
//!
//! Records export to JSON or CSV; reports render to Markdown or JSON.

use std::fmt::Write as _;
use std::str::FromStr;

use super::report::ProductivityReport;
use super::TaskCompletionRecord;
use crate::error::{LoopError, Result};

/// Export format for completion records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// JSON array format.
    Json,
    /// CSV format with headers.
    Csv,
}

impl ExportFormat {
    /// Get the file extension for this format.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = LoopError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(LoopError::invalid_format(s, "json, csv")),
        }
    }
}

/// Output format for productivity reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl ReportFormat {
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Json => "json",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = LoopError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "json" => Ok(ReportFormat::Json),
            _ => Err(LoopError::invalid_format(s, "markdown, json")),
        }
    }
}

/// Exporter for completion history.
///
/// # Example
///
/// ```rust,ignore
/// use prdloop::history::{ExportFormat, HistoryExporter};
///
/// let csv = HistoryExporter::export(&records, ExportFormat::Csv)?;
/// ```
pub struct HistoryExporter;

impl HistoryExporter {
    /// Export records to the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export(records: &[TaskCompletionRecord], format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(records)?),
            ExportFormat::Csv => Ok(Self::export_csv(records)),
        }
    }

    fn export_csv(records: &[TaskCompletionRecord]) -> String {
        let mut csv = String::new();

        // Header
        csv.push_str("id,date,completed_at,description,duration_ms,iteration,project,session_id\n");

        for record in records {
            let _ = writeln!(
                csv,
                "{},{},{},{},{},{},{},{}",
                escape_csv(&record.id),
                record.date,
                record.completed_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                escape_csv(&record.description),
                record.duration_ms,
                record.iteration,
                escape_csv(&record.project_name),
                escape_csv(&record.session_id),
            );
        }

        csv
    }

    /// Render a report in the requested format.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_report(report: &ProductivityReport, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            ReportFormat::Markdown => Ok(render_markdown(report)),
        }
    }

    /// Render UI log entries as plain text, one per line.
    #[must_use]
    pub fn render_log(entries: &[String]) -> String {
        let mut out = String::new();
        for entry in entries {
            out.push_str(entry);
            out.push('\n');
        }
        out
    }
}

/// Format milliseconds as `1h 2m`, `3m 4s` or `5s`.
#[must_use]
pub fn format_duration_ms(ms: u64) -> String {
    let secs = ms / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

fn render_markdown(report: &ProductivityReport) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Productivity Report ({})", report.period);
    let _ = writeln!(md);
    let _ = writeln!(md, "{} to {}", report.start_date, report.end_date);
    let _ = writeln!(md);

    let _ = writeln!(md, "## Summary");
    let _ = writeln!(md);
    let _ = writeln!(md, "- Tasks completed: {}", report.total_tasks);
    let _ = writeln!(md, "- Sessions: {}", report.total_sessions);
    let _ = writeln!(md, "- Projects: {}", report.total_projects);
    let time = &report.time_breakdown;
    let _ = writeln!(md, "- Total time: {}", format_duration_ms(time.total_ms));
    let _ = writeln!(
        md,
        "- Average task: {}",
        format_duration_ms(time.average_ms.round() as u64)
    );
    let _ = writeln!(
        md,
        "- Fastest / slowest: {} / {}",
        format_duration_ms(time.min_ms),
        format_duration_ms(time.max_ms)
    );

    if !report.projects.is_empty() {
        let _ = writeln!(md);
        let _ = writeln!(md, "## Projects");
        let _ = writeln!(md);
        let _ = writeln!(md, "| Project | Tasks | Time | Tasks % | Time % |");
        let _ = writeln!(md, "|---|---|---|---|---|");
        for p in &report.projects {
            let _ = writeln!(
                md,
                "| {} | {} | {} | {:.1} | {:.1} |",
                p.project_name,
                p.task_count,
                format_duration_ms(p.total_time_ms),
                p.task_percentage,
                p.time_percentage
            );
        }
    }

    if !report.daily_activity.is_empty() {
        let _ = writeln!(md);
        let _ = writeln!(md, "## Daily Activity");
        let _ = writeln!(md);
        for day in &report.daily_activity {
            let _ = writeln!(
                md,
                "- {}: {} tasks, {}",
                day.date,
                day.task_count,
                format_duration_ms(day.total_time_ms)
            );
        }
    }

    let trends = &report.trends;
    let _ = writeln!(md);
    let _ = writeln!(md, "## Trends");
    let _ = writeln!(md);
    let _ = writeln!(md, "- Tasks per day: {:.1}", trends.avg_tasks_per_day);
    let _ = writeln!(md, "- Busiest day: {}", trends.busiest_day_name());
    let _ = writeln!(md, "- Busiest hour: {:02}:00", trends.busiest_hour);
    let _ = writeln!(
        md,
        "- Trend: {} ({:.1}%)",
        trends.direction, trends.change_percent
    );
    let _ = writeln!(
        md,
        "- Streak: {} days current, {} days longest",
        trends.current_streak, trends.longest_streak
    );
    md
}

/// Escape a string for CSV output.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::report::{ReportPeriod, ReportWindow};
    use crate::history::test_support::record_at;
    use chrono::{Local, TimeZone, Utc};

    #[test]
    fn test_export_format_from_str() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
        assert_eq!("md".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
    }

    #[test]
    fn test_escape_csv_with_comma_and_quotes() {
        assert_eq!(escape_csv("hello"), "hello");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_export_has_header_and_rows() {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 9, 30, 0).unwrap();
        let records = vec![record_at("Parse, then write", at, 1_500, "s1", "app")];
        let csv = HistoryExporter::export(&records, ExportFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("id,date,completed_at"));
        assert!(lines[1].contains("\"Parse, then write\""));
        assert!(lines[1].contains("2024-02-01T09:30:00.000Z"));
    }

    #[test]
    fn test_json_export_round_trips() {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 9, 30, 0).unwrap();
        let records = vec![record_at("A", at, 1_000, "s1", "app")];
        let json = HistoryExporter::export(&records, ExportFormat::Json).unwrap();
        let back: Vec<TaskCompletionRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration_ms(4_000), "4s");
        assert_eq!(format_duration_ms(125_000), "2m 5s");
        assert_eq!(format_duration_ms(3_720_000), "1h 2m");
    }

    #[test]
    fn test_markdown_report_sections() {
        let start = Local.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap();
        let window = ReportWindow {
            start,
            end: start + chrono::Duration::hours(12),
        };
        let report = ProductivityReport::empty(ReportPeriod::Today, &window);
        let md = HistoryExporter::render_report(&report, ReportFormat::Markdown).unwrap();
        assert!(md.starts_with("# Productivity Report (today)"));
        assert!(md.contains("- Tasks completed: 0"));
        assert!(md.contains("## Trends"));
        assert!(!md.contains("## Projects"));
    }

    #[test]
    fn test_render_log_one_entry_per_line() {
        let text = HistoryExporter::render_log(&["a".into(), "b".into()]);
        assert_eq!(text, "a\nb\n");
    }
}
