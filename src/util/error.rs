// LogMerge - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// All errors preserve the causal chain for diagnostic logging.
//
// Note: nothing in the reload path propagates these to the caller. A
// `ReadError` is rendered into an in-band Error record; the others surface
// only at the binary's edges (command-line values, initial load, export).

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level error type for all LogMerge operations.
#[derive(Debug)]
pub enum LogMergeError {
    /// A tracked log file could not be read.
    Read(ReadError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// Export operation failed.
    Export(ExportError),

    /// A command-line value was not recognised.
    InvalidArgument {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    /// The first merged view was not published in time.
    InitialLoadTimeout { waited: Duration },
}

impl fmt::Display for LogMergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(e) => write!(f, "Read error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Export(e) => write!(f, "Export error: {e}"),
            Self::InvalidArgument {
                name,
                value,
                expected,
            } => write!(f, "Unknown {name} '{value}' (expected {expected})"),
            Self::InitialLoadTimeout { waited } => write!(
                f,
                "Timed out after {}s waiting for the initial load",
                waited.as_secs()
            ),
        }
    }
}

impl std::error::Error for LogMergeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Export(e) => Some(e),
            Self::InvalidArgument { .. } | Self::InitialLoadTimeout { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Read errors
// ---------------------------------------------------------------------------

/// Errors raised while reading a tracked log file during a reload.
#[derive(Debug)]
pub enum ReadError {
    /// The file does not exist (yet).
    NotFound { path: PathBuf },

    /// The process lacks permission to open the file.
    PermissionDenied { path: PathBuf, source: io::Error },

    /// The path exists but is a directory or other non-regular file.
    NotAFile { path: PathBuf },

    /// File content is not valid UTF-8.
    InvalidEncoding {
        path: PathBuf,
        source: std::str::Utf8Error,
    },

    /// Any other I/O failure.
    Io { path: PathBuf, source: io::Error },
}

impl ReadError {
    /// Classify an `io::Error` raised while opening or reading `path`.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path, source },
            io::ErrorKind::InvalidData => match source
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<std::str::Utf8Error>())
                .copied()
            {
                Some(utf8) => Self::InvalidEncoding { path, source: utf8 },
                None => Self::Io { path, source },
            },
            _ => Self::Io { path, source },
        }
    }

    /// Path of the file that failed.
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound { path }
            | Self::PermissionDenied { path, .. }
            | Self::NotAFile { path }
            | Self::InvalidEncoding { path, .. }
            | Self::Io { path, .. } => path,
        }
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { path } => {
                write!(f, "Cannot read '{}': file not found", path.display())
            }
            Self::PermissionDenied { path, source } => write!(
                f,
                "Cannot read '{}': permission denied ({source})",
                path.display()
            ),
            Self::NotAFile { path } => {
                write!(f, "Cannot read '{}': not a regular file", path.display())
            }
            Self::InvalidEncoding { path, source } => write!(
                f,
                "Cannot read '{}': invalid UTF-8 encoding ({source})",
                path.display()
            ),
            Self::Io { path, source } => {
                write!(f, "Cannot read '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PermissionDenied { source, .. } | Self::Io { source, .. } => Some(source),
            Self::InvalidEncoding { source, .. } => Some(source),
            Self::NotFound { .. } | Self::NotAFile { .. } => None,
        }
    }
}

impl From<ReadError> for LogMergeError {
    fn from(e: ReadError) -> Self {
        Self::Read(e)
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to writing a merged view out.
#[derive(Debug)]
pub enum ExportError {
    /// I/O error writing the output.
    Io { source: io::Error },

    /// CSV serialisation error.
    Csv { source: csv::Error },

    /// JSON serialisation error.
    Json { source: serde_json::Error },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { source } => write!(f, "Export I/O error: {source}"),
            Self::Csv { source } => write!(f, "CSV export error: {source}"),
            Self::Json { source } => write!(f, "JSON export error: {source}"),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source } => Some(source),
            Self::Csv { source } => Some(source),
            Self::Json { source } => Some(source),
        }
    }
}

impl ExportError {
    /// True when the output was closed by the reader (e.g. `| head`).
    pub fn is_closed_output(&self) -> bool {
        match self {
            Self::Io { source } => source.kind() == io::ErrorKind::BrokenPipe,
            Self::Csv { source } => matches!(
                source.kind(),
                csv::ErrorKind::Io(e) if e.kind() == io::ErrorKind::BrokenPipe
            ),
            Self::Json { source } => source.is_io(),
        }
    }
}

impl From<ExportError> for LogMergeError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            Self::ValueOutOfRange { .. } => None,
        }
    }
}

impl From<ConfigError> for LogMergeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for LogMerge results.
pub type Result<T> = std::result::Result<T, LogMergeError>;
