use crate::record::{LogHeader, LogLevel, LogRecord};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

// 2022-04-19 10:24:34.051 13445-13451/com.example.app A/libc: message
static LONG_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3}) +(\d+)-(\d+)/(\S+) +([VDIWEAF])/(.*?): (.*)$",
    )
    .expect("valid long line regex")
});

// 04-19 10:24:34.051 13445 13451 A libc  : message  (year optional)
static THREADTIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(\d{4})-)?(\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3}) +(\d+) +(\d+) +([VDIWEAF]) +(.*?) *: (.*)$",
    )
    .expect("valid threadtime regex")
});

// --------- beginning of crash
static DIVIDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-{2,} beginning of .+").expect("valid divider regex"));

/// Errors reading a log file from disk. Malformed lines are not errors:
/// they either continue the previous record or are skipped.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read log file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Reads and parses one logcat text file. Timestamps are interpreted in
/// `zone`; `base_year` fills in formats that do not carry a year.
pub fn read_log_file(
    path: impl AsRef<Path>,
    zone: FixedOffset,
    base_year: i32,
) -> Result<Vec<LogRecord>, ReadError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ReadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse_log_text(&text, zone, base_year))
}

/// Parses logcat text into records. Recognizes the long format
/// (`2022-04-19 10:24:34.051 13445-13451/com.example.app A/libc: msg`) and
/// the threadtime format (`04-19 10:24:34.051 13445 13451 A libc: msg`,
/// year optional). Buffer divider lines become system records. Any other
/// line continues the previous record's message, which keeps multi-line
/// crash bodies as one record; leading junk with no record to attach to is
/// skipped.
pub fn parse_log_text(text: &str, zone: FixedOffset, base_year: i32) -> Vec<LogRecord> {
    let mut records: Vec<LogRecord> = Vec::new();

    for line in text.lines() {
        if DIVIDER_RE.is_match(line) {
            records.push(LogRecord::system_divider(line));
            continue;
        }
        if let Some(record) = parse_long_line(line, zone).or_else(|| parse_threadtime_line(line, zone, base_year)) {
            records.push(record);
            continue;
        }
        if let Some(last) = records.last_mut() {
            if !last.is_system() {
                last.message.push('\n');
                last.message.push_str(line);
            }
        }
    }

    records
}

fn parse_long_line(line: &str, zone: FixedOffset) -> Option<LogRecord> {
    let captures = LONG_LINE_RE.captures(line)?;
    let timestamp = to_utc(captures.get(1)?.as_str(), zone)?;
    let application_id = match captures.get(4)?.as_str() {
        "?" => String::new(),
        app => app.to_string(),
    };
    Some(LogRecord::new(
        LogHeader {
            level: captures.get(5)?.as_str().parse().ok()?,
            pid: captures.get(2)?.as_str().parse().ok()?,
            tid: captures.get(3)?.as_str().parse().ok()?,
            application_id: application_id.clone(),
            process_name: application_id,
            tag: captures.get(6)?.as_str().to_string(),
            timestamp,
        },
        captures.get(7)?.as_str(),
    ))
}

fn parse_threadtime_line(line: &str, zone: FixedOffset, base_year: i32) -> Option<LogRecord> {
    let captures = THREADTIME_RE.captures(line)?;
    let year = match captures.get(1) {
        Some(year) => year.as_str().parse().ok()?,
        None => base_year,
    };
    let timestamp = to_utc(&format!("{}-{}", year, captures.get(2)?.as_str()), zone)?;
    Some(LogRecord::new(
        LogHeader {
            level: captures.get(5)?.as_str().parse().ok()?,
            pid: captures.get(3)?.as_str().parse().ok()?,
            tid: captures.get(4)?.as_str().parse().ok()?,
            application_id: String::new(),
            process_name: String::new(),
            tag: captures.get(6)?.as_str().to_string(),
            timestamp,
        },
        captures.get(7)?.as_str(),
    ))
}

fn to_utc(text: &str, zone: FixedOffset) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.3f").ok()?;
    zone.from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
}
