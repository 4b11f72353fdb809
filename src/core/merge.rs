// LogMerge - core/merge.rs
//
// Merge of per-file record sequences into one time-ordered sequence.
// Core layer: pure logic, no I/O.

use crate::core::model::LogRecord;
use chrono::{DateTime, Local};
use std::cmp::Ordering;

/// Ordering used for the merged view.
///
/// Timestamped records compare by time and always come before
/// timestamp-less ones. Two timestamp-less records are `Equal`, so a stable
/// sort keeps them in their original order.
pub fn compare_timestamps(a: &Option<DateTime<Local>>, b: &Option<DateTime<Local>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Concatenate per-file sequences in the order given and stable-sort the
/// result by timestamp.
///
/// File order is the tie-break among records that compare equal, which in
/// practice means among timestamp-less records and identical instants.
pub fn merge_sources(sources: Vec<Vec<LogRecord>>) -> Vec<LogRecord> {
    let total = sources.iter().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total);
    for records in sources {
        merged.extend(records);
    }
    // `sort_by` is stable.
    merged.sort_by(|a, b| compare_timestamps(&a.timestamp, &b.timestamp));
    merged
}

/// True when `records` satisfies the merged-view ordering: timestamps
/// non-decreasing, and no timestamp-less record ahead of a timestamped one.
pub fn is_merge_ordered(records: &[LogRecord]) -> bool {
    let mut seen_untimed = false;
    let mut last: Option<DateTime<Local>> = None;
    for record in records {
        match record.timestamp {
            Some(ts) => {
                if seen_untimed || last.is_some_and(|prev| prev > ts) {
                    return false;
                }
                last = Some(ts);
            }
            None => seen_untimed = true,
        }
    }
    true
}
