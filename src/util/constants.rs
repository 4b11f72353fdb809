// LogMerge - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "LogMerge";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "LogMerge";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Parsing limits
// =============================================================================

/// Maximum size of a single record message in bytes. Longer messages are
/// truncated so a file without line breaks cannot produce one giant record.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024; // 64 KB

/// Hard upper bound on the configurable message cap.
pub const ABSOLUTE_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024; // 16 MB

/// Minimum configurable message cap.
pub const MIN_MAX_MESSAGE_BYTES: usize = 256;

/// Maximum number of physical lines joined into one structured record when
/// multi-line joining is enabled.
pub const DEFAULT_MAX_RECORD_LINES: usize = 64;

/// Hard upper bound on the configurable line-join limit.
pub const ABSOLUTE_MAX_RECORD_LINES: usize = 4_096;

/// Suffix appended to a message cut at `max_message_bytes`.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

// =============================================================================
// File reading
// =============================================================================

/// File size threshold in bytes above which the file is memory-mapped
/// instead of read into a heap buffer.
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024; // 100 MB

/// Retry limits for transient I/O errors while reading a tracked file.
pub const MAX_READ_RETRIES: usize = 3;

/// Backoff delays between read retries (ms).
pub const READ_RETRY_DELAYS_MS: [u64; MAX_READ_RETRIES] = [50, 100, 200];

// =============================================================================
// Polling
// =============================================================================

/// How often the change watcher re-stats every tracked file (ms).
pub const POLL_INTERVAL_MS: u64 = 1_000;

/// Minimum user-configurable poll interval (ms).
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Maximum user-configurable poll interval (ms).
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// How often the cancel flag is checked within each poll sleep (ms).
/// Bounds how long `Aggregator::shutdown` waits for the watcher thread.
pub const POLL_CANCEL_CHECK_INTERVAL_MS: u64 = 50;

// =============================================================================
// Console output
// =============================================================================

/// Number of newest records printed after each update in follow mode.
pub const DEFAULT_TAIL_LINES: usize = 20;

/// Maximum configurable tail length.
pub const MAX_TAIL_LINES: usize = 10_000;

/// How long the console waits for the first merged view before giving up.
pub const INITIAL_LOAD_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a log line included in debug output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";
