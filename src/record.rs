use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::cell::OnceCell;
use std::fmt;
use std::str::FromStr;

/// Log levels in ascending severity order.
///
/// The derived `Ord` is what `level:` filters compare against: a filter
/// threshold of `WARN` retains `WARN`, `ERROR` and `ASSERT` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warn,
    Error,
    Assert,
}

impl LogLevel {
    /// The single-letter form used in logcat output (`V`, `D`, `I`, `W`, `E`, `A`).
    pub fn letter(&self) -> char {
        match self {
            LogLevel::Verbose => 'V',
            LogLevel::Debug => 'D',
            LogLevel::Info => 'I',
            LogLevel::Warn => 'W',
            LogLevel::Error => 'E',
            LogLevel::Assert => 'A',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Verbose => "VERBOSE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Assert => "ASSERT",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogLevel {
    type Err = ();

    /// Accepts full names and single letters, case-insensitively.
    /// `F` is the logcat alias for the highest severity.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "V" | "VERBOSE" => Ok(LogLevel::Verbose),
            "D" | "DEBUG" => Ok(LogLevel::Debug),
            "I" | "INFO" => Ok(LogLevel::Info),
            "W" | "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "E" | "ERROR" => Ok(LogLevel::Error),
            "A" | "F" | "ASSERT" | "FATAL" => Ok(LogLevel::Assert),
            _ => Err(()),
        }
    }
}

/// Header fields of a logcat record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogHeader {
    pub level: LogLevel,
    pub pid: u32,
    pub tid: u32,
    /// Application id (package name) of the logging process, empty when the
    /// source format does not carry one.
    pub application_id: String,
    /// Process name, empty when unknown.
    pub process_name: String,
    pub tag: String,
    pub timestamp: DateTime<Utc>,
}

/// One logcat record: a header plus a (possibly multi-line) message body.
///
/// Buffer divider lines (`--------- beginning of crash`) become synthetic
/// system records; those bypass filtering entirely.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub header: LogHeader,
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    system: bool,
}

impl LogRecord {
    pub fn new(header: LogHeader, message: impl Into<String>) -> Self {
        LogRecord {
            header,
            message: message.into(),
            system: false,
        }
    }

    /// A synthetic system record. Carries only a message; header fields are
    /// placeholders and are never consulted by the master filter.
    pub fn system_divider(message: impl Into<String>) -> Self {
        LogRecord {
            header: LogHeader {
                level: LogLevel::Verbose,
                pid: 0,
                tid: 0,
                application_id: String::new(),
                process_name: String::new(),
                tag: String::new(),
                timestamp: DateTime::UNIX_EPOCH,
            },
            message: message.into(),
            system: true,
        }
    }

    pub fn is_system(&self) -> bool {
        self.system
    }
}

/// Formats a record the way logcat prints it, with the timestamp rendered
/// in `zone`:
///
/// ```text
/// 2022-04-19 10:24:34.051 13445-13445/com.example.app A/libc: Fatal signal 11
/// ```
///
/// System records render as their bare message.
pub fn format_line(record: &LogRecord, zone: FixedOffset) -> String {
    if record.is_system() {
        return record.message.clone();
    }
    let header = &record.header;
    format!(
        "{} {}-{}/{} {}/{}: {}",
        header.timestamp.with_timezone(&zone).format("%Y-%m-%d %H:%M:%S%.3f"),
        header.pid,
        header.tid,
        if header.application_id.is_empty() {
            "?"
        } else {
            &header.application_id
        },
        header.level.letter(),
        header.tag,
        record.message
    )
}

/// A record plus the timezone context needed to resolve line-oriented
/// filter fields. The formatted line is computed at most once per record
/// per sweep, and only if a filter actually asks for it.
pub struct RecordView<'a> {
    record: &'a LogRecord,
    zone: FixedOffset,
    line: OnceCell<String>,
}

impl<'a> RecordView<'a> {
    pub fn new(record: &'a LogRecord, zone: FixedOffset) -> Self {
        RecordView {
            record,
            zone,
            line: OnceCell::new(),
        }
    }

    pub fn record(&self) -> &LogRecord {
        self.record
    }

    pub fn line(&self) -> &str {
        self.line.get_or_init(|| format_line(self.record, self.zone))
    }
}
