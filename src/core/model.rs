// LogMerge - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no platform
// dependencies. These types are the shared vocabulary across all layers.

use crate::util::error::ReadError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of process-local record identities. Starts at 1 so 0 never
/// appears as a real id.
static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh process-local record identity.
fn next_record_id() -> u64 {
    NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed)
}

// =============================================================================
// Log Record (normalised output of parsing)
// =============================================================================

/// A single parsed log line.
///
/// Records are immutable once built and produced fresh on every re-parse.
/// `id` is only a stable handle for list widgets; it takes no part in
/// equality or ordering.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    /// Process-local unique identity assigned at creation.
    #[serde(skip)]
    pub id: u64,

    /// Parsed timestamp in local time. `None` for plain-text lines and for
    /// structured lines whose date/time did not parse.
    pub timestamp: Option<DateTime<Local>>,

    /// The combined `"date time"` text as it appeared in the source, kept
    /// for display even when `timestamp` failed to parse.
    pub raw_timestamp: Option<String>,

    /// Emitting subsystem (structured records only).
    pub component: Option<String>,

    /// Normalised severity level.
    pub severity: Severity,

    /// Message text, verbatim. Plain-text lines carry the whole line.
    pub message: String,

    /// Name of the file the record came from.
    pub source_file: Option<String>,
}

impl LogRecord {
    /// Build a record for a line that did not match the structured format.
    pub fn plain(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: next_record_id(),
            timestamp: None,
            raw_timestamp: None,
            component: None,
            severity,
            message: message.into(),
            source_file: None,
        }
    }

    /// Build a record for a structured line.
    pub fn structured(
        message: impl Into<String>,
        severity: Severity,
        component: impl Into<String>,
        raw_timestamp: String,
        timestamp: Option<DateTime<Local>>,
    ) -> Self {
        Self {
            id: next_record_id(),
            timestamp,
            raw_timestamp: Some(raw_timestamp),
            component: Some(component.into()),
            severity,
            message: message.into(),
            source_file: None,
        }
    }

    /// Synthesise the single Error row that stands in for a file that could
    /// not be read during a reload.
    pub fn read_failure(file_name: &str, error: &ReadError) -> Self {
        let mut record = Self::plain(error.to_string(), Severity::Error);
        record.source_file = Some(file_name.to_string());
        record
    }

    /// Tag the record with its originating file name.
    pub fn with_source(mut self, file_name: &str) -> Self {
        self.source_file = Some(file_name.to_string());
        self
    }

    /// True when the record came from the tag-delimited format.
    pub fn is_structured(&self) -> bool {
        self.raw_timestamp.is_some()
    }
}

impl PartialEq for LogRecord {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && self.raw_timestamp == other.raw_timestamp
            && self.component == other.component
            && self.severity == other.severity
            && self.message == other.message
            && self.source_file == other.source_file
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Severity levels of the tracing format, by numeric `type` code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum Severity {
    Unknown,
    #[default]
    Information,
    Warning,
    Error,
}

impl Severity {
    /// Map a numeric `type` attribute. Codes outside 0..=3 are `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Severity::Information,
            2 => Severity::Warning,
            3 => Severity::Error,
            _ => Severity::Unknown,
        }
    }

    /// The format's numeric code for this level.
    pub fn code(&self) -> u8 {
        match self {
            Severity::Unknown => 0,
            Severity::Information => 1,
            Severity::Warning => 2,
            Severity::Error => 3,
        }
    }

    /// Returns all variants, most severe first.
    pub fn all() -> &'static [Severity] {
        &[
            Severity::Error,
            Severity::Warning,
            Severity::Information,
            Severity::Unknown,
        ]
    }

    /// Human-readable label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Unknown => "Unknown",
            Severity::Information => "Information",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
        }
    }

    /// Short label for compact display (e.g. table columns).
    pub fn short_label(&self) -> &'static str {
        match self {
            Severity::Unknown => "???",
            Severity::Information => "INFO",
            Severity::Warning => "WARN",
            Severity::Error => "ERR",
        }
    }

    /// Parse a user-supplied level name (CLI / config). Case-insensitive,
    /// accepts labels, short labels and numeric codes.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        Self::all().iter().copied().find(|s| {
            lower == s.label().to_lowercase()
                || lower == s.short_label().to_lowercase()
                || lower == s.code().to_string()
        })
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Merged View (published aggregate)
// =============================================================================

/// One published snapshot of the merged, sorted record sequence.
///
/// Always complete and unfiltered. Replaced wholesale on every reload.
#[derive(Debug, Clone, Default)]
pub struct MergedView {
    /// Sorted records from every tracked file.
    pub records: Vec<LogRecord>,

    /// 0 for the empty view held before the first reload completes,
    /// then incremented by one per publish.
    pub generation: u64,

    /// Number of tracked files that contributed to this view.
    pub file_count: usize,
}

impl MergedView {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The newest record, i.e. the one a "follow latest" consumer scrolls to.
    pub fn latest(&self) -> Option<&LogRecord> {
        self.records.last()
    }

    /// Record counts per severity level.
    pub fn severity_counts(&self) -> HashMap<Severity, usize> {
        let mut counts = HashMap::new();
        for record in &self.records {
            *counts.entry(record.severity).or_insert(0) += 1;
        }
        counts
    }
}

// =============================================================================
// Aggregator events (for consumer updates)
// =============================================================================

/// Messages sent from the aggregator's worker thread to its consumer.
#[derive(Debug, Clone)]
pub enum AggregatorEvent {
    /// A reload finished and a new merged view was published.
    ViewUpdated { view: Arc<MergedView> },

    /// The aggregator stopped; no further events follow.
    Stopped,
}
