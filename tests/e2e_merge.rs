// LogMerge - tests/e2e_merge.rs
//
// End-to-end tests for the read, parse, merge and publish pipeline.
//
// These tests exercise the real filesystem, real background threads, real
// modification-time polling and real chrono timestamp parsing. They cover
// the path from raw log files on disk to a published, time-ordered view.

use chrono::{Local, TimeZone};
use logmerge::app::aggregator::{reload_all, Aggregator, AggregatorConfig};
use logmerge::core::export::{export, ExportFormat};
use logmerge::core::filter::{apply_filters, FilterState};
use logmerge::core::merge::is_merge_ordered;
use logmerge::core::model::{AggregatorEvent, MergedView, Severity};
use logmerge::platform::config::load_config;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

// =============================================================================
// Helpers
// =============================================================================

const WAIT: Duration = Duration::from_secs(10);

/// Absolute path to the on-disk fixture files.
fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn cm_line(message: &str, time: &str) -> String {
    format!(
        r#"<![LOG[{message}]LOG]!><time="{time}" date="07-27-2025" component="Test" context="" type="1" thread="7" file="t.cpp">"#
    )
}

/// Aggregator that only reloads when asked.
fn manual_config() -> AggregatorConfig {
    AggregatorConfig {
        poll_interval: Duration::from_secs(60),
        ..AggregatorConfig::default()
    }
}

/// Block until a published view satisfies `accept`.
fn wait_for_view(
    aggregator: &Aggregator,
    accept: impl Fn(&MergedView) -> bool,
) -> Option<Arc<MergedView>> {
    let deadline = Instant::now() + WAIT;
    loop {
        let view = aggregator.snapshot();
        if accept(&view) {
            return Some(view);
        }
        let remaining = deadline.checked_duration_since(Instant::now())?;
        aggregator.wait_for_event(remaining.min(Duration::from_millis(100)));
    }
}

fn messages(view: &MergedView) -> Vec<&str> {
    view.records.iter().map(|r| r.message.as_str()).collect()
}

fn touch_forward(path: &Path, appended: &str) {
    let mut file = fs::OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(appended.as_bytes()).unwrap();
    // Push the mtime clearly past the baseline regardless of filesystem
    // timestamp granularity.
    file.set_modified(SystemTime::now() + Duration::from_secs(5))
        .unwrap();
}

// =============================================================================
// Fixture merge
// =============================================================================

/// Structured and plain fixtures merge into one timeline with untimed
/// records last, in file order.
#[test]
fn e2e_fixture_files_merge_in_time_order() {
    let files = vec![fixture("ccm_agent.log"), fixture("app_plain.log")];
    let records = reload_all(&files, &AggregatorConfig::default());

    assert_eq!(records.len(), 6);
    assert!(is_merge_ordered(&records));

    let first = &records[0];
    assert_eq!(first.message, "Agent started.");
    assert_eq!(first.component.as_deref(), Some("SMSAgent"));
    assert_eq!(first.severity, Severity::Information);
    assert_eq!(first.source_file.as_deref(), Some("ccm_agent.log"));
    let expected = Local.with_ymd_and_hms(2025, 7, 27, 15, 30, 0).single();
    assert_eq!(first.timestamp, expected);

    // Offset suffix ignored: 15:30:05.250 local, no shift.
    let failed = &records[1];
    assert_eq!(failed.severity, Severity::Error);
    assert_eq!(
        failed.timestamp.unwrap().format("%H:%M:%S%.3f").to_string(),
        "15:30:05.250"
    );
    assert_eq!(records[2].severity, Severity::Warning);

    let tail: Vec<_> = records[3..].iter().map(|r| r.message.as_str()).collect();
    assert_eq!(
        tail,
        vec![
            "Service host starting",
            "WARNING: cache directory missing, recreating",
            "ERROR: disk full"
        ]
    );

    let disk_full = &records[5];
    assert_eq!(disk_full.severity, Severity::Error);
    assert!(disk_full.component.is_none());
    assert!(disk_full.timestamp.is_none());
    assert_eq!(disk_full.source_file.as_deref(), Some("app_plain.log"));
}

/// File A at 10:00 and file B at 09:00 plus an untimed line.
#[test]
fn e2e_aggregator_publishes_merged_view() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.log");
    let b = dir.path().join("b.log");
    fs::write(&a, cm_line("A at ten", "10:00:00.000")).unwrap();
    fs::write(
        &b,
        format!("{}\nno timestamp here\n", cm_line("B at nine", "09:00:00.000")),
    )
    .unwrap();

    let aggregator = Aggregator::with_config(vec![a, b], manual_config());
    let view = aggregator.wait_for_generation(1, WAIT).unwrap();

    assert_eq!(view.file_count, 2);
    assert_eq!(
        messages(&view),
        vec!["B at nine", "A at ten", "no timestamp here"]
    );
}

/// A missing file becomes a single Error record; the rest still load.
#[test]
fn e2e_missing_file_reported_in_view() {
    let dir = tempfile::tempdir().unwrap();
    let present = dir.path().join("present.log");
    fs::write(&present, cm_line("still here", "08:00:00.000")).unwrap();
    let missing = dir.path().join("never_created.log");

    let aggregator = Aggregator::with_config(vec![missing, present], manual_config());
    let view = aggregator.wait_for_generation(1, WAIT).unwrap();

    assert_eq!(view.len(), 2);
    assert_eq!(view.records[0].message, "still here");
    let failure = &view.records[1];
    assert_eq!(failure.severity, Severity::Error);
    assert!(failure.message.contains("never_created.log"));
    assert_eq!(failure.source_file.as_deref(), Some("never_created.log"));
}

// =============================================================================
// Reload behaviour
// =============================================================================

/// Two manual reloads with nothing changed on disk give identical views.
#[test]
fn e2e_manual_reload_is_idempotent() {
    let files = vec![fixture("ccm_agent.log"), fixture("app_plain.log")];
    let aggregator = Aggregator::with_config(files, manual_config());

    let first = aggregator.wait_for_generation(1, WAIT).unwrap();
    aggregator.reload();
    let second = aggregator.wait_for_generation(first.generation + 1, WAIT).unwrap();

    assert!(second.generation > first.generation);
    assert_eq!(first.records, second.records);
}

/// Modifying one tracked file republishes a view that reflects the new
/// content and still contains the untouched file's records.
#[test]
fn e2e_polling_picks_up_modified_file() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.log");
    let b = dir.path().join("b.log");
    fs::write(&a, format!("{}\n", cm_line("first A", "10:00:00.000"))).unwrap();
    fs::write(&b, format!("{}\n", cm_line("only B", "09:30:00.000"))).unwrap();

    let config = AggregatorConfig {
        poll_interval: Duration::from_millis(100),
        ..AggregatorConfig::default()
    };
    let aggregator = Aggregator::with_config(vec![a.clone(), b], config);
    let initial = aggregator.wait_for_generation(1, WAIT).unwrap();
    assert_eq!(messages(&initial), vec!["only B", "first A"]);

    touch_forward(&a, &format!("{}\n", cm_line("second A", "09:00:00.000")));

    let updated = wait_for_view(&aggregator, |view| view.len() == 3)
        .expect("modified file should trigger a republish");
    assert!(updated.generation > initial.generation);
    assert_eq!(messages(&updated), vec!["second A", "only B", "first A"]);
}

/// After shutdown, reload requests are ignored and nothing more is
/// published.
#[test]
fn e2e_shutdown_stops_publishing() {
    let mut aggregator =
        Aggregator::with_config(vec![fixture("app_plain.log")], manual_config());
    aggregator.wait_for_generation(1, WAIT).unwrap();

    aggregator.shutdown();
    let drained = aggregator.poll_events();
    assert!(matches!(drained.last(), Some(AggregatorEvent::Stopped)));

    let generation = aggregator.snapshot().generation;
    aggregator.reload();
    std::thread::sleep(Duration::from_millis(200));
    assert!(aggregator.poll_events().is_empty());
    assert_eq!(aggregator.snapshot().generation, generation);
}

// =============================================================================
// Config, filtering and output
// =============================================================================

/// `[parsing] multiline = "join"` in config.toml reassembles a record whose
/// message spans lines.
#[test]
fn e2e_join_mode_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        "[parsing]\nmultiline = \"join\"\n\n[polling]\ninterval_ms = 60000\n",
    )
    .unwrap();
    let (app_config, warnings) = load_config(&config_path);
    assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");

    let log = dir.path().join("multi.log");
    fs::write(
        &log,
        "<![LOG[Line one\nline two]LOG]!><time=\"11:00:00.000\" date=\"07-27-2025\" component=\"Setup\" context=\"\" type=\"2\" thread=\"1\" file=\"\">\n",
    )
    .unwrap();

    let aggregator =
        Aggregator::with_config(vec![log], AggregatorConfig::from_app_config(&app_config));
    let view = aggregator.wait_for_generation(1, WAIT).unwrap();

    assert_eq!(view.len(), 1);
    assert_eq!(view.records[0].message, "Line one\nline two");
    assert_eq!(view.records[0].severity, Severity::Warning);
}

/// The consumer filters and exports a published view without changing it.
#[test]
fn e2e_filter_and_export_view() {
    let files = vec![fixture("ccm_agent.log"), fixture("app_plain.log")];
    let aggregator = Aggregator::with_config(files, manual_config());
    let view = aggregator.wait_for_generation(1, WAIT).unwrap();

    let filter = FilterState::default().at_least(Severity::Error);
    let indices = apply_filters(&view.records, &filter);
    assert_eq!(indices.len(), 2);

    let selected: Vec<_> = indices.iter().map(|&i| &view.records[i]).collect();
    let mut out = Vec::new();
    let written = export(&selected, ExportFormat::Text, &mut out).unwrap();
    assert_eq!(written, 2);

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("[PolicyAgent] ccm_agent.log: Policy download failed."));
    assert!(lines[1].ends_with("[-] app_plain.log: ERROR: disk full"));

    assert_eq!(view.len(), 6, "published view stays complete");
}
