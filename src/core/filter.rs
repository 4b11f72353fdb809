// LogMerge - core/filter.rs
//
// Consumer-side filtering of a merged view. The aggregator never applies
// these; its published view is always complete.
// Core layer: pure logic, no I/O.

use crate::core::model::{LogRecord, Severity};
use std::collections::HashSet;

/// Filter state. All fields are AND-combined when applied.
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    /// Severity levels to include (empty = all).
    pub severities: HashSet<Severity>,

    /// Substring text search (case-insensitive). Empty = no filter.
    pub text: String,
}

impl FilterState {
    /// Text-only filter, the shape the aggregator's filter string maps to.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Include `min` and every more severe level. `Unknown` is only
    /// included when `min` is `Unknown`.
    pub fn at_least(mut self, min: Severity) -> Self {
        self.severities = Severity::all()
            .iter()
            .copied()
            .filter(|s| *s >= min)
            .collect();
        self
    }

    /// Returns true if no filters are active.
    pub fn is_empty(&self) -> bool {
        self.severities.is_empty() && self.text.trim().is_empty()
    }
}

/// Apply filters to a slice of records, returning indices of matching records.
///
/// Indices keep the merged order so a table can map rows back to records.
pub fn apply_filters(records: &[LogRecord], filter: &FilterState) -> Vec<usize> {
    if filter.is_empty() {
        return (0..records.len()).collect();
    }

    let text_lower = filter.text.trim().to_lowercase();

    records
        .iter()
        .enumerate()
        .filter(|(_, record)| matches_all(record, filter, &text_lower))
        .map(|(idx, _)| idx)
        .collect()
}

/// Check if a single record matches all active filters.
fn matches_all(record: &LogRecord, filter: &FilterState, text_lower: &str) -> bool {
    if !filter.severities.is_empty() && !filter.severities.contains(&record.severity) {
        return false;
    }

    if text_lower.is_empty() {
        return true;
    }

    // Text search covers message, component and source file name.
    [
        Some(record.message.as_str()),
        record.component.as_deref(),
        record.source_file.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(text_lower))
}
