// LogMerge - main.rs
//
// Console entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and logging initialisation (debug mode support)
// 3. Pattern expansion into the tracked file list
// 4. Printing the merged view once, or following it as files change

use clap::Parser;
use logmerge::app::aggregator::{Aggregator, AggregatorConfig};
use logmerge::core::export::{self, ExportFormat};
use logmerge::core::filter::{self, FilterState};
use logmerge::core::model::{AggregatorEvent, LogRecord, MergedView, Severity};
use logmerge::platform::{config, fs};
use logmerge::util::error::{ExportError, LogMergeError, Result};
use logmerge::util::{self, constants};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

/// LogMerge - live, time-ordered merge of CMTrace-style and plain-text logs.
///
/// Reads every listed file, parses both the structured
/// `<![LOG[...]LOG]!><time=... date=...>` format and plain text, and prints
/// one combined timeline. With --follow, keeps polling the files and
/// reprints the newest records whenever any of them changes.
#[derive(Parser, Debug)]
#[command(name = "LogMerge", version, about)]
struct Cli {
    /// Log files or glob patterns. Patterns with no match are kept as paths.
    #[arg(required = true)]
    paths: Vec<String>,

    /// Keep running and print updates as files change.
    #[arg(short = 'f', long = "follow")]
    follow: bool,

    /// Print only the newest N matching records.
    #[arg(short = 'n', long = "tail")]
    tail: Option<usize>,

    /// Case-insensitive text filter on message, component and file name.
    #[arg(short = 's', long = "search")]
    search: Option<String>,

    /// Minimum severity to print (unknown, info, warning, error).
    #[arg(short = 'l', long = "min-level")]
    min_level: Option<String>,

    /// Output format: text, csv or json.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Alternate config.toml location.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "Fatal");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Config is loaded before logging so its level can take effect; its
    // warnings are reported once the subscriber exists.
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| config::PlatformPaths::resolve().config_file);
    let (app_config, config_warnings) = config::load_config(&config_path);

    util::logging::init(cli.debug, app_config.log_level.as_deref());

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        config = %config_path.display(),
        "LogMerge starting"
    );
    for warning in &config_warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    let format_name = cli.output.as_deref().unwrap_or(&app_config.output_format);
    let format =
        ExportFormat::from_name(format_name).ok_or_else(|| LogMergeError::InvalidArgument {
            name: "output format",
            value: format_name.to_string(),
            expected: "text, csv or json",
        })?;

    let mut filter_state = FilterState::from_text(cli.search.clone().unwrap_or_default());
    if let Some(ref name) = cli.min_level {
        let min = Severity::from_name(name).ok_or_else(|| LogMergeError::InvalidArgument {
            name: "severity",
            value: name.clone(),
            expected: "unknown, info, warning or error",
        })?;
        filter_state = filter_state.at_least(min);
    }

    let tail = cli
        .tail
        .or(cli.follow.then_some(app_config.tail_lines))
        .map(|n| n.min(constants::MAX_TAIL_LINES));

    let files = fs::expand_patterns(&cli.paths);
    tracing::info!(files = files.len(), "Tracking files");

    let mut aggregator =
        Aggregator::with_config(files, AggregatorConfig::from_app_config(&app_config));
    aggregator.set_follow_latest(cli.follow);
    aggregator.set_filter_text(filter_state.text.clone());

    let timeout = Duration::from_secs(constants::INITIAL_LOAD_TIMEOUT_SECS);
    let view = aggregator
        .wait_for_generation(1, timeout)
        .ok_or(LogMergeError::InitialLoadTimeout { waited: timeout })?;

    if !print_view(&view, &filter_state, tail, format)? || !aggregator.follow_latest() {
        aggregator.shutdown();
        return Ok(());
    }

    loop {
        match aggregator.wait_for_event(Duration::from_millis(constants::POLL_INTERVAL_MS)) {
            Some(AggregatorEvent::ViewUpdated { view }) => {
                if format == ExportFormat::Text {
                    let banner = writeln!(
                        io::stdout().lock(),
                        "==> update {} ({} records from {} files) <==",
                        view.generation,
                        view.len(),
                        view.file_count
                    );
                    if !still_open(banner.map_err(|source| ExportError::Io { source }))? {
                        break;
                    }
                }
                if !print_view(&view, &filter_state, tail, format)? {
                    break;
                }
            }
            Some(AggregatorEvent::Stopped) => break,
            None => {}
        }
    }

    aggregator.shutdown();
    Ok(())
}

/// Filter, trim to `tail`, and write to stdout. `Ok(false)` means stdout
/// was closed by the reader and the caller should stop quietly.
fn print_view(
    view: &MergedView,
    filter_state: &FilterState,
    tail: Option<usize>,
    format: ExportFormat,
) -> Result<bool> {
    let selected = select_records(view, filter_state, tail);
    let written = export::export(&selected, format, io::stdout().lock()).map(|count| {
        tracing::debug!(
            generation = view.generation,
            printed = count,
            total = view.len(),
            "View printed"
        );
    });
    still_open(written)
}

fn still_open(result: std::result::Result<(), ExportError>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_closed_output() => {
            tracing::debug!(error = %e, "Stdout closed; stopping");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn select_records<'a>(
    view: &'a MergedView,
    filter_state: &FilterState,
    tail: Option<usize>,
) -> Vec<&'a LogRecord> {
    let indices = filter::apply_filters(&view.records, filter_state);
    let skip = tail.map_or(0, |n| indices.len().saturating_sub(n));
    indices[skip..].iter().map(|&i| &view.records[i]).collect()
}
