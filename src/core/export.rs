// LogMerge - core/export.rs
//
// Text, CSV and JSON rendering of merged records.
// Core layer: writes to any Write trait object.

use crate::core::model::LogRecord;
use crate::util::error::ExportError;
use serde::Serialize;
use std::io::Write;

/// Output formats supported by the console consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Text,
    Csv,
    Json,
}

impl ExportFormat {
    /// Parse a format name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Display form of a record's time: the parsed instant when available,
/// otherwise the raw source text, otherwise empty.
pub fn display_time(record: &LogRecord) -> String {
    match (&record.timestamp, &record.raw_timestamp) {
        (Some(ts), _) => ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        (None, Some(raw)) => raw.clone(),
        (None, None) => String::new(),
    }
}

/// Write records in `format`. Returns the number of records written.
pub fn export<W: Write>(
    records: &[&LogRecord],
    format: ExportFormat,
    writer: W,
) -> Result<usize, ExportError> {
    match format {
        ExportFormat::Text => export_text(records, writer),
        ExportFormat::Csv => export_csv(records, writer),
        ExportFormat::Json => export_json(records, writer),
    }
}

/// One line per record: time, severity, component, source, message.
///
/// Multi-line messages are written as-is; continuation lines are indented
/// so they remain visually attached to their record.
pub fn export_text<W: Write>(records: &[&LogRecord], mut writer: W) -> Result<usize, ExportError> {
    let io_err = |source| ExportError::Io { source };

    for record in records {
        let time = display_time(record);
        let message = record.message.replace('\n', "\n    ");
        writeln!(
            writer,
            "{:<23} {:<4} [{}] {}: {}",
            time,
            record.severity.short_label(),
            record.component.as_deref().unwrap_or("-"),
            record.source_file.as_deref().unwrap_or("-"),
            message
        )
        .map_err(io_err)?;
    }
    writer.flush().map_err(io_err)?;
    Ok(records.len())
}

/// Writes: timestamp, raw_timestamp, severity, component, source_file, message
pub fn export_csv<W: Write>(records: &[&LogRecord], writer: W) -> Result<usize, ExportError> {
    let csv_err = |source| ExportError::Csv { source };
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record([
            "timestamp",
            "raw_timestamp",
            "severity",
            "component",
            "source_file",
            "message",
        ])
        .map_err(csv_err)?;

    for record in records {
        let ts = record
            .timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();

        csv_writer
            .write_record([
                ts.as_str(),
                record.raw_timestamp.as_deref().unwrap_or(""),
                record.severity.label(),
                record.component.as_deref().unwrap_or(""),
                record.source_file.as_deref().unwrap_or(""),
                record.message.as_str(),
            ])
            .map_err(csv_err)?;
    }

    csv_writer
        .flush()
        .map_err(|source| ExportError::Io { source })?;

    Ok(records.len())
}

/// Export records as a JSON array of objects.
pub fn export_json<W: Write>(records: &[&LogRecord], writer: W) -> Result<usize, ExportError> {
    #[derive(Serialize)]
    struct Row<'a> {
        #[serde(flatten)]
        record: &'a LogRecord,
        severity_code: u8,
    }

    let rows: Vec<Row<'_>> = records
        .iter()
        .map(|record| Row {
            record,
            severity_code: record.severity.code(),
        })
        .collect();

    serde_json::to_writer_pretty(writer, &rows).map_err(|source| ExportError::Json { source })?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Severity;

    fn make_record(message: &str) -> LogRecord {
        LogRecord::structured(
            message,
            Severity::Error,
            "ContentTransferManager",
            "13-45-2025 10:00:00.000".to_string(),
            None,
        )
        .with_source("CAS.log")
    }

    #[test]
    fn test_csv_export() {
        let records = [make_record("Error one"), make_record("Error, two")];
        let refs: Vec<&LogRecord> = records.iter().collect();
        let mut buf = Vec::new();
        let count = export_csv(&refs, &mut buf).unwrap();
        assert_eq!(count, 2);

        let output = String::from_utf8(buf).unwrap();
        assert!(output.starts_with("timestamp,raw_timestamp,severity"));
        assert!(output.contains("Error one"));
        assert!(output.contains("\"Error, two\""));
        assert!(output.contains("ContentTransferManager"));
    }

    #[test]
    fn test_json_export() {
        let records = [make_record("Test message")];
        let refs: Vec<&LogRecord> = records.iter().collect();
        let mut buf = Vec::new();
        let count = export_json(&refs, &mut buf).unwrap();
        assert_eq!(count, 1);

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value[0]["message"], "Test message");
        assert_eq!(value[0]["severity"], "Error");
        assert_eq!(value[0]["severity_code"], 3);
        assert_eq!(value[0]["source_file"], "CAS.log");
        assert!(value[0].get("id").is_none());
    }

    #[test]
    fn test_text_export_falls_back_to_raw_time() {
        let records = [make_record("line one\nline two")];
        let refs: Vec<&LogRecord> = records.iter().collect();
        let mut buf = Vec::new();
        export_text(&refs, &mut buf).unwrap();

        let output = String::from_utf8(buf).unwrap();
        assert!(output.starts_with("13-45-2025 10:00:00.000"));
        assert!(output.contains(" ERR  [ContentTransferManager] CAS.log: line one\n    line two"));
    }

    #[test]
    fn test_format_from_name() {
        assert_eq!(ExportFormat::from_name("CSV"), Some(ExportFormat::Csv));
        assert_eq!(ExportFormat::from_name("json"), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::from_name("txt"), Some(ExportFormat::Text));
        assert_eq!(ExportFormat::from_name("xml"), None);
    }
}
