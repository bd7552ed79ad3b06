use chrono::FixedOffset;
use logsieve::filter::{FilterParser, MasterFilter, StaticPackageNames, SystemClock};
use logsieve::reader::parse_log_text;
use logsieve::record::LogRecord;
use std::sync::Arc;

const CRASH_LOG: &str = "\
--------- beginning of main
2022-04-19 10:20:29.000 13253-13253/com.example.nativeapplication I/Choreographer: Skipped 3 frames
2022-04-19 10:20:30.892 13253-13253/com.example.nativeapplication E/AndroidRuntime: FATAL EXCEPTION: main
Process: com.example.nativeapplication, PID: 13253
java.lang.RuntimeException: boom
  at android.app.ActivityThread.performLaunchActivity(ActivityThread.java:3449)
  at android.app.ActivityThread.handleLaunchActivity(ActivityThread.java:3601)
2022-04-19 10:24:34.051 13445-13445/com.example.nativeapplication A/libc: Fatal signal 11 (SIGSEGV), code 1 (SEGV_MAPERR)
2022-04-19 10:24:34.092 13474-13474/? A/DEBUG: *** *** *** *** *** *** *** ***
2022-04-19 10:25:00.000 13500-13500/com.other W/NetworkScheduler: sync took 30s
";

fn zone() -> FixedOffset {
    FixedOffset::east_opt(0).expect("valid offset")
}

fn sift(expression: &str, packages: &[&str]) -> Vec<LogRecord> {
    let records = parse_log_text(CRASH_LOG, zone(), 2022);
    let parser = FilterParser::new(
        Arc::new(StaticPackageNames::new(packages.iter().copied())),
        Arc::new(SystemClock),
    );
    let node = parser.parse(expression).expect("expression should parse");
    MasterFilter::new(node).filter(&records, zone())
}

#[test]
fn test_reader_produces_expected_record_stream() {
    let records = parse_log_text(CRASH_LOG, zone(), 2022);
    assert_eq!(records.len(), 6);
    assert!(records[0].is_system());
    // The JVM crash body folded into one record.
    assert!(records[2].message.contains("performLaunchActivity"));
}

#[test]
fn test_crash_expression_finds_jvm_and_native_headers() {
    let kept = sift("is:crash", &[]);
    let tags: Vec<&str> = kept
        .iter()
        .filter(|r| !r.is_system())
        .map(|r| r.header.tag.as_str())
        .collect();
    assert_eq!(tags, ["AndroidRuntime", "libc", "DEBUG"]);
}

#[test]
fn test_stacktrace_expression_finds_folded_exception_body() {
    let kept = sift("is:stacktrace", &[]);
    let non_system: Vec<&LogRecord> = kept.iter().filter(|r| !r.is_system()).collect();
    assert_eq!(non_system.len(), 1);
    assert!(non_system[0].message.starts_with("FATAL EXCEPTION"));
}

#[test]
fn test_package_mine_with_crash_or_stacktrace() {
    let kept = sift(
        "package:mine (is:crash | is:stacktrace)",
        &["com.example.nativeapplication"],
    );
    let non_system: Vec<&LogRecord> = kept.iter().filter(|r| !r.is_system()).collect();
    // The DEBUG record has no application id and the warning is not a crash.
    assert_eq!(non_system.len(), 2);
    for record in non_system {
        assert_eq!(record.header.application_id, "com.example.nativeapplication");
    }
}

#[test]
fn test_tag_and_level_expression() {
    let kept = sift("tag:networkscheduler level:WARN", &[]);
    let non_system: Vec<&LogRecord> = kept.iter().filter(|r| !r.is_system()).collect();
    assert_eq!(non_system.len(), 1);
    assert_eq!(non_system[0].header.application_id, "com.other");
}

#[test]
fn test_negated_app_expression_drops_other_apps() {
    let kept = sift("-app:com.other level:INFO", &[]);
    assert!(
        kept.iter()
            .filter(|r| !r.is_system())
            .all(|r| r.header.application_id != "com.other")
    );
}

#[test]
fn test_line_field_sees_formatted_metadata() {
    // "13474" only appears in the header, never in a message body.
    let kept = sift("line:13474", &[]);
    let non_system: Vec<&LogRecord> = kept.iter().filter(|r| !r.is_system()).collect();
    assert_eq!(non_system.len(), 1);
    assert_eq!(non_system[0].header.tag, "DEBUG");
}

#[test]
fn test_system_divider_passes_every_expression() {
    for expression in ["is:crash", "tag:nothing", "-line:e"] {
        let kept = sift(expression, &[]);
        assert!(kept[0].is_system(), "divider dropped by '{expression}'");
    }
}
