// LogMerge - platform/config.rs
//
// Configuration directory resolution and config.toml loading with startup
// validation. Uses the `directories` crate for XDG (Linux), AppData
// (Windows) and Library (macOS) compliance.

use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for LogMerge configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/logmerge/ or %APPDATA%\LogMerge\config\)
    pub config_dir: PathBuf,

    /// Full path of config.toml inside `config_dir`.
    pub config_file: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        let config_dir = match ProjectDirs::from("", "", constants::APP_ID) {
            Some(proj_dirs) => proj_dirs.config_dir().to_path_buf(),
            None => {
                tracing::warn!(
                    "Could not determine platform directories, using current directory"
                );
                PathBuf::from(".")
            }
        };
        let config_file = config_dir.join(constants::CONFIG_FILE_NAME);

        tracing::debug!(
            config = %config_dir.display(),
            file = %config_file.display(),
            "Platform paths resolved"
        );

        Self {
            config_dir,
            config_file,
        }
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[polling]` section.
    pub polling: PollingSection,
    /// `[parsing]` section.
    pub parsing: ParsingSection,
    /// `[output]` section.
    pub output: OutputSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[polling]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct PollingSection {
    /// Interval between modification-time checks (ms).
    pub interval_ms: Option<u64>,
}

/// `[parsing]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ParsingSection {
    /// "line" (one record per line) or "join" (reassemble multi-line records).
    pub multiline: Option<String>,
    /// Maximum lines joined into one record.
    pub max_record_lines: Option<usize>,
    /// Maximum message size in bytes.
    pub max_message_bytes: Option<usize>,
    /// Files above this size are memory-mapped.
    pub large_file_threshold_bytes: Option<u64>,
}

/// `[output]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// "text", "csv" or "json".
    pub format: Option<String>,
    /// Records shown per update in follow mode.
    pub tail_lines: Option<usize>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    // -- Polling --
    pub poll_interval_ms: u64,

    // -- Parsing --
    pub join_multiline: bool,
    pub max_record_lines: usize,
    pub max_message_bytes: usize,
    pub large_file_threshold: u64,

    // -- Output --
    pub output_format: String,
    pub tail_lines: usize,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: constants::POLL_INTERVAL_MS,
            join_multiline: false,
            max_record_lines: constants::DEFAULT_MAX_RECORD_LINES,
            max_message_bytes: constants::DEFAULT_MAX_MESSAGE_BYTES,
            large_file_threshold: constants::DEFAULT_LARGE_FILE_THRESHOLD,
            output_format: "text".to_string(),
            tail_lines: constants::DEFAULT_TAIL_LINES,
            log_level: None,
        }
    }
}

const OUTPUT_FORMATS: &[&str] = &["text", "csv", "json"];
const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Load and validate `config.toml` at `config_path`.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first-run).
/// If the file is unreadable or unparseable, returns defaults with a warning.
pub fn load_config(config_path: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(source) => {
            let err = ConfigError::Io {
                path: config_path.to_path_buf(),
                source,
            };
            warnings.push(format!("{err}. Using defaults."));
            return (AppConfig::default(), warnings);
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(source) => {
            let err = ConfigError::TomlParse {
                path: config_path.to_path_buf(),
                source,
            };
            warnings.push(format!("{err}. Using defaults."));
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");

    let config = validate(raw, &mut warnings);

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

/// Validate each field against named constants, accumulating all problems.
fn validate(raw: RawConfig, warnings: &mut Vec<String>) -> AppConfig {
    let mut config = AppConfig::default();

    let mut out_of_range = |field: &str, value: String, expected: String, default: String| {
        let err = ConfigError::ValueOutOfRange {
            field: field.to_string(),
            value,
            expected,
        };
        warnings.push(format!("{err}. Using default ({default})."));
    };

    // -- Polling: interval_ms --
    if let Some(ms) = raw.polling.interval_ms {
        if (constants::MIN_POLL_INTERVAL_MS..=constants::MAX_POLL_INTERVAL_MS).contains(&ms) {
            config.poll_interval_ms = ms;
        } else {
            out_of_range(
                "polling.interval_ms",
                ms.to_string(),
                format!(
                    "{}-{}",
                    constants::MIN_POLL_INTERVAL_MS,
                    constants::MAX_POLL_INTERVAL_MS
                ),
                constants::POLL_INTERVAL_MS.to_string(),
            );
        }
    }

    // -- Parsing: multiline --
    if let Some(ref mode) = raw.parsing.multiline {
        match mode.to_lowercase().as_str() {
            "line" => config.join_multiline = false,
            "join" => config.join_multiline = true,
            other => out_of_range(
                "parsing.multiline",
                other.to_string(),
                "\"line\" or \"join\"".to_string(),
                "line".to_string(),
            ),
        }
    }

    // -- Parsing: max_record_lines --
    if let Some(lines) = raw.parsing.max_record_lines {
        if (1..=constants::ABSOLUTE_MAX_RECORD_LINES).contains(&lines) {
            config.max_record_lines = lines;
        } else {
            out_of_range(
                "parsing.max_record_lines",
                lines.to_string(),
                format!("1-{}", constants::ABSOLUTE_MAX_RECORD_LINES),
                constants::DEFAULT_MAX_RECORD_LINES.to_string(),
            );
        }
    }

    // -- Parsing: max_message_bytes --
    if let Some(bytes) = raw.parsing.max_message_bytes {
        if (constants::MIN_MAX_MESSAGE_BYTES..=constants::ABSOLUTE_MAX_MESSAGE_BYTES)
            .contains(&bytes)
        {
            config.max_message_bytes = bytes;
        } else {
            out_of_range(
                "parsing.max_message_bytes",
                bytes.to_string(),
                format!(
                    "{}-{}",
                    constants::MIN_MAX_MESSAGE_BYTES,
                    constants::ABSOLUTE_MAX_MESSAGE_BYTES
                ),
                constants::DEFAULT_MAX_MESSAGE_BYTES.to_string(),
            );
        }
    }

    // -- Parsing: large_file_threshold_bytes --
    if let Some(threshold) = raw.parsing.large_file_threshold_bytes {
        config.large_file_threshold = threshold;
    }

    // -- Output: format --
    if let Some(ref format) = raw.output.format {
        let lower = format.to_lowercase();
        if OUTPUT_FORMATS.contains(&lower.as_str()) {
            config.output_format = lower;
        } else {
            out_of_range(
                "output.format",
                format.clone(),
                OUTPUT_FORMATS.join(", "),
                "text".to_string(),
            );
        }
    }

    // -- Output: tail_lines --
    if let Some(lines) = raw.output.tail_lines {
        if (1..=constants::MAX_TAIL_LINES).contains(&lines) {
            config.tail_lines = lines;
        } else {
            out_of_range(
                "output.tail_lines",
                lines.to_string(),
                format!("1-{}", constants::MAX_TAIL_LINES),
                constants::DEFAULT_TAIL_LINES.to_string(),
            );
        }
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        if LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.to_lowercase());
        } else {
            out_of_range(
                "logging.level",
                level.clone(),
                LOG_LEVELS.join(", "),
                constants::DEFAULT_LOG_LEVEL.to_string(),
            );
        }
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(constants::CONFIG_FILE_NAME);
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = load_config(&dir.path().join("absent.toml"));
        assert_eq!(config, AppConfig::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_valid_config_applied() {
        let (_dir, path) = write_config(
            r#"
[polling]
interval_ms = 250

[parsing]
multiline = "join"
max_record_lines = 8

[output]
format = "JSON"
tail_lines = 5

[logging]
level = "debug"
"#,
        );
        let (config, warnings) = load_config(&path);
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
        assert_eq!(config.poll_interval_ms, 250);
        assert!(config.join_multiline);
        assert_eq!(config.max_record_lines, 8);
        assert_eq!(config.output_format, "json");
        assert_eq!(config.tail_lines, 5);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_out_of_range_values_fall_back() {
        let (_dir, path) = write_config(
            r#"
[polling]
interval_ms = 5

[parsing]
multiline = "sometimes"

[output]
format = "xml"
"#,
        );
        let (config, warnings) = load_config(&path);
        assert_eq!(warnings.len(), 3, "warnings: {warnings:?}");
        assert_eq!(config.poll_interval_ms, constants::POLL_INTERVAL_MS);
        assert!(!config.join_multiline);
        assert_eq!(config.output_format, "text");
        assert!(warnings[0].contains("polling.interval_ms"));
    }

    #[test]
    fn test_malformed_toml_warns_and_uses_defaults() {
        let (_dir, path) = write_config("[polling\ninterval_ms = ");
        let (config, warnings) = load_config(&path);
        assert_eq!(config, AppConfig::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Config parse error"));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let (_dir, path) = write_config("[future]\nthing = 1\n[polling]\ninterval_ms = 2000\n");
        let (config, warnings) = load_config(&path);
        assert!(warnings.is_empty());
        assert_eq!(config.poll_interval_ms, 2000);
    }
}
