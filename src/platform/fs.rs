// LogMerge - platform/fs.rs
//
// Filesystem access for tracked log files: whole-file reads and
// modification-time probes. Everything here blocks, so callers run it off
// the consumer's thread.

use crate::util::constants::{MAX_READ_RETRIES, READ_RETRY_DELAYS_MS};
use crate::util::error::ReadError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Read the full content of a tracked log file as UTF-8 text.
///
/// Files above `large_file_threshold` bytes are memory-mapped instead of
/// copied into a heap buffer first. A leading UTF-8 byte-order mark is
/// dropped. Invalid UTF-8 is reported, not replaced.
pub fn read_log_file(path: &Path, large_file_threshold: u64) -> Result<String, ReadError> {
    let metadata = fs::metadata(path).map_err(|e| ReadError::from_io(path, e))?;
    if !metadata.is_file() {
        return Err(ReadError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    if metadata.len() > large_file_threshold {
        tracing::debug!(
            file = %path.display(),
            size = metadata.len(),
            "Reading large file via memory map"
        );
        read_mapped(path)
    } else {
        let bytes = read_with_retry(path).map_err(|e| ReadError::from_io(path, e))?;
        decode_utf8(path, &bytes)
    }
}

/// Read using `memmap2` (avoids allocating a second full-size buffer).
fn read_mapped(path: &Path) -> Result<String, ReadError> {
    let file = fs::File::open(path).map_err(|e| ReadError::from_io(path, e))?;
    // SAFETY: the map is read-only and dropped before returning. A writer
    // truncating the file while it is mapped can fault the read; log writers
    // append, and the next poll re-reads the file anyway.
    let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|e| ReadError::from_io(path, e))?;
    decode_utf8(path, &mmap)
}

/// Read a file with transient-error retries.
fn read_with_retry(path: &Path) -> io::Result<Vec<u8>> {
    let mut last_err: Option<io::Error> = None;

    for (attempt, delay_ms) in READ_RETRY_DELAYS_MS.iter().enumerate().take(MAX_READ_RETRIES) {
        match fs::read(path) {
            Ok(bytes) => return Ok(bytes),
            Err(e) if is_transient_error(&e) => {
                tracing::debug!(
                    file = %path.display(),
                    attempt = attempt + 1,
                    error = %e,
                    "Transient I/O error, retrying"
                );
                std::thread::sleep(Duration::from_millis(*delay_ms));
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| io::Error::other("Unknown read error")))
}

/// Returns true for transient I/O errors that are worth retrying.
fn is_transient_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}

fn decode_utf8(path: &Path, bytes: &[u8]) -> Result<String, ReadError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|source| ReadError::InvalidEncoding {
            path: path.to_path_buf(),
            source,
        })
}

/// Last modification time of `path`.
pub fn modified_time(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// The label records from `path` are tagged with: its file name, or the
/// whole path when it has none.
pub fn source_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Expand command-line patterns into the tracked file list.
///
/// Each pattern is globbed once; matches are added in the glob crate's
/// sorted order. A pattern that matches no regular file is kept as a literal
/// path so it still shows up in the merged view, as an error record if it
/// never appears.
pub fn expand_patterns(patterns: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for pattern in patterns {
        let matched: Vec<PathBuf> = match glob::glob(pattern) {
            Ok(entries) => entries
                .filter_map(|entry| match entry {
                    Ok(path) => Some(path),
                    Err(e) => {
                        tracing::debug!(pattern = %pattern, error = %e, "Glob entry unreadable");
                        None
                    }
                })
                .filter(|path| path.is_file())
                .collect(),
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "Invalid glob pattern; using it as a path");
                Vec::new()
            }
        };

        if matched.is_empty() {
            files.push(PathBuf::from(pattern));
        } else {
            tracing::debug!(pattern = %pattern, matches = matched.len(), "Pattern expanded");
            files.extend(matched);
        }
    }

    files
}
