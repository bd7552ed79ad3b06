use crate::filter::FilterParseError;
use crate::record::{LogLevel, LogRecord, format_line};
use chrono::FixedOffset;
use colored::{ColoredString, Colorize};
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde_json::json;
use std::collections::HashMap;
use std::fmt::Write;

/// Prints retained records to stdout, one formatted line per record,
/// colored by severity. System dividers are dimmed.
pub fn print_records(records: &[LogRecord], zone: FixedOffset) {
    for record in records {
        println!("{}", colorize_line(format_line(record, zone), record));
    }
}

/// The same output as [`print_records`], uncolored, for `--output` files.
pub fn render_records_text(records: &[LogRecord], zone: FixedOffset) -> String {
    let mut out = String::new();
    for record in records {
        let _ = writeln!(out, "{}", format_line(record, zone));
    }
    out
}

pub fn render_records_json(records: &[LogRecord]) -> String {
    serde_json::to_string_pretty(records)
        .unwrap_or_else(|_| "{\"error\":\"failed to serialize records\"}".into())
}

fn colorize_line(line: String, record: &LogRecord) -> ColoredString {
    if record.is_system() {
        return line.dimmed();
    }
    match record.header.level {
        LogLevel::Verbose | LogLevel::Debug => line.dimmed(),
        LogLevel::Info => line.normal(),
        LogLevel::Warn => line.yellow(),
        LogLevel::Error => line.red(),
        LogLevel::Assert => line.red().bold(),
    }
}

fn styled_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).fg(Color::Cyan).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

fn sorted_counts<'a>(entries: impl Iterator<Item = &'a str>) -> Vec<(&'a str, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        *counts.entry(entry).or_insert(0) += 1;
    }
    let mut sorted: Vec<(&str, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    sorted
}

/// Per-level and per-tag count tables for the retained records. System
/// dividers are excluded from the counts.
pub fn render_stats_text(records: &[LogRecord]) -> String {
    let logs: Vec<&LogRecord> = records.iter().filter(|r| !r.is_system()).collect();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} records ({} system dividers excluded)",
        logs.len(),
        records.len() - logs.len()
    );
    if logs.is_empty() {
        return out;
    }

    let total = logs.len();
    let mut levels = styled_table(&["Level", "Count", "Percent"]);
    for (name, count) in sorted_counts(logs.iter().map(|r| r.header.level.name())) {
        levels.add_row(vec![
            Cell::new(name),
            Cell::new(count),
            Cell::new(format!("{:>6.2}%", (count as f64 / total as f64) * 100.0)),
        ]);
    }
    let _ = writeln!(out, "\nLOG LEVELS\n{levels}");

    let mut tags = styled_table(&["Tag", "Count", "Percent"]);
    for (name, count) in sorted_counts(logs.iter().map(|r| r.header.tag.as_str())) {
        let display = if name.is_empty() { "<none>" } else { name };
        tags.add_row(vec![
            Cell::new(display),
            Cell::new(count),
            Cell::new(format!("{:>6.2}%", (count as f64 / total as f64) * 100.0)),
        ]);
    }
    let _ = writeln!(out, "\nTAGS\n{tags}");
    out
}

pub fn render_stats_json(records: &[LogRecord]) -> String {
    let logs: Vec<&LogRecord> = records.iter().filter(|r| !r.is_system()).collect();
    let level_counts: HashMap<&str, usize> = sorted_counts(logs.iter().map(|r| r.header.level.name()))
        .into_iter()
        .collect();
    let tag_counts: HashMap<&str, usize> = sorted_counts(logs.iter().map(|r| r.header.tag.as_str()))
        .into_iter()
        .collect();
    serde_json::to_string_pretty(&json!({
        "stats": {
            "total": logs.len(),
            "system_dividers": records.len() - logs.len(),
            "levels": level_counts,
            "tags": tag_counts,
        }
    }))
    .unwrap_or_else(|_| "{\"stats\":{\"error\":\"failed to serialize stats\"}}".into())
}

/// Renders a parse error with a caret line pointing at the offending
/// substring of the expression:
///
/// ```text
/// invalid regular expression '(': ...
///   message~:(
///            ^
/// ```
pub fn render_parse_error(expression: &str, error: &FilterParseError) -> String {
    let range = error.range();
    let width = (range.end.saturating_sub(range.start)).max(1);
    format!(
        "{error}\n  {expression}\n  {}{}",
        " ".repeat(range.start),
        "^".repeat(width)
    )
}
