//! Configuration file loading with precedence handling.

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::search::{SearchConfig, DEFAULT_SEARCH_SEGMENT_SIZE};
use crate::source::analyzer::{DEFAULT_SAMPLE_SIZE, DEFAULT_STREAM_THRESHOLD};
use crate::source::segment::DEFAULT_MAX_SEGMENT_SIZE;
use crate::source::{AnalyzerConfig, LoaderLimits};
use crate::state::controller::DEFAULT_BUFFER_LINES;
use crate::state::ViewportConfig;
use crate::view_state::DEFAULT_MAX_CACHED_LINES;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "STREAMVIEW_CONFIG";

/// Environment override for `max_segment_size`.
pub const MAX_SEGMENT_SIZE_ENV_VAR: &str = "STREAMVIEW_MAX_SEGMENT_SIZE";

/// Environment override for `max_cached_lines`.
pub const MAX_CACHED_LINES_ENV_VAR: &str = "STREAMVIEW_MAX_CACHED_LINES";

/// Default number of concurrent segment reads.
pub const DEFAULT_MAX_CONCURRENT_READS: usize = 2;

/// Errors that can occur during config loading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A config path or override value could not be used.
    #[error("Invalid config path: {0}")]
    InvalidPath(String),

    /// Failed to read config file (permission issues, not a file, ...).
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError {
        /// Path that failed to read.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// Config file contains invalid TOML or unknown keys.
    #[error("Invalid TOML in {path}: {reason}")]
    ParseError {
        /// Path with invalid TOML.
        path: PathBuf,
        /// Parse error details.
        reason: String,
    },
}

/// TOML configuration file structure.
///
/// All fields are optional - if not specified, hardcoded defaults are used.
/// Corresponds to `~/.config/streamview/config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Files larger than this many bytes are streamed.
    #[serde(default)]
    pub stream_threshold: Option<u64>,

    /// Upper bound on bytes returned by a single segment load.
    #[serde(default)]
    pub max_segment_size: Option<u64>,

    /// Upper bound on lines held in the viewport cache.
    #[serde(default)]
    pub max_cached_lines: Option<usize>,

    /// Lines prefetched above and below the visible window.
    #[serde(default)]
    pub buffer_lines: Option<u64>,

    /// Bytes sampled for encoding detection and line estimation.
    #[serde(default)]
    pub sample_size: Option<usize>,

    /// Bytes requested per search step.
    #[serde(default)]
    pub search_segment_size: Option<u64>,

    /// Maximum simultaneous segment reads.
    #[serde(default)]
    pub max_concurrent_reads: Option<usize>,

    /// Path to log file for tracing output.
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,
}

/// Resolved configuration after applying precedence rules.
///
/// Created by merging defaults, config file, env vars, and CLI args.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Streaming threshold in bytes.
    pub stream_threshold: u64,
    /// Maximum segment size in bytes.
    pub max_segment_size: u64,
    /// Maximum cached lines.
    pub max_cached_lines: usize,
    /// Prefetch margin in lines.
    pub buffer_lines: u64,
    /// Analysis sample size in bytes.
    pub sample_size: usize,
    /// Search step size in bytes.
    pub search_segment_size: u64,
    /// Concurrent read limit.
    pub max_concurrent_reads: usize,
    /// Path to log file for tracing output.
    pub log_file_path: PathBuf,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            stream_threshold: DEFAULT_STREAM_THRESHOLD,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            max_cached_lines: DEFAULT_MAX_CACHED_LINES,
            buffer_lines: DEFAULT_BUFFER_LINES,
            sample_size: DEFAULT_SAMPLE_SIZE,
            search_segment_size: DEFAULT_SEARCH_SEGMENT_SIZE,
            max_concurrent_reads: DEFAULT_MAX_CONCURRENT_READS,
            log_file_path: default_log_path(),
        }
    }
}

impl ResolvedConfig {
    /// Settings for [`analyze_file`](crate::source::analyze_file).
    pub fn analyzer(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            stream_threshold: self.stream_threshold,
            sample_size: self.sample_size,
        }
    }

    /// Limits for [`SegmentLoader`](crate::source::SegmentLoader).
    pub fn loader_limits(&self) -> LoaderLimits {
        LoaderLimits {
            max_segment_size: self.max_segment_size,
        }
    }

    /// Settings for the viewport controller.
    pub fn viewport(&self) -> ViewportConfig {
        ViewportConfig {
            buffer_lines: self.buffer_lines,
            max_cached_lines: self.max_cached_lines,
        }
    }

    /// Settings for the search engine.
    pub fn search(&self) -> SearchConfig {
        SearchConfig {
            segment_size: self.search_segment_size,
        }
    }
}

/// Resolve default log file path.
///
/// Returns `~/.local/state/streamview/streamview.log` on Unix-like systems,
/// or appropriate platform path on other systems.
///
/// If state directory cannot be determined, falls back to current directory.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        state_dir.join("streamview").join("streamview.log")
    } else {
        PathBuf::from("streamview.log")
    }
}

/// Load configuration file from a specific path.
///
/// Returns `Ok(None)` if file doesn't exist (not an error - use defaults).
///
/// # Errors
///
/// Returns error if file exists but has read or parse errors.
pub fn load_config_file(path: impl Into<PathBuf>) -> Result<Option<ConfigFile>, ConfigError> {
    let path = path.into();

    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    let config: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    Ok(Some(config))
}

/// Resolve default config file path.
///
/// Returns `~/.config/streamview/config.toml` on Unix, appropriate path on other
/// platforms, or `None` if no config directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("streamview").join("config.toml"))
}

/// Load configuration with precedence handling.
///
/// Precedence (highest to lowest):
/// 1. Explicit `config_path` argument (CLI `--config`)
/// 2. `STREAMVIEW_CONFIG` environment variable
/// 3. Default path `~/.config/streamview/config.toml`
///
/// # Errors
///
/// Returns error only if a config file exists but cannot be read or parsed.
pub fn load_config_with_precedence(
    config_path: Option<PathBuf>,
) -> Result<Option<ConfigFile>, ConfigError> {
    if let Some(path) = config_path {
        return load_config_file(path);
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        if env_path.is_empty() {
            return Err(ConfigError::InvalidPath(format!("{CONFIG_ENV_VAR} is empty")));
        }
        return load_config_file(PathBuf::from(env_path));
    }

    if let Some(default_path) = default_config_path() {
        return load_config_file(default_path);
    }

    Ok(None)
}

/// Merge config file into defaults to create resolved config.
///
/// For each field in `ConfigFile`, if `Some(value)`, use it; otherwise use default.
pub fn merge_config(config_file: Option<ConfigFile>) -> ResolvedConfig {
    let defaults = ResolvedConfig::default();

    let Some(config) = config_file else {
        return defaults;
    };

    ResolvedConfig {
        stream_threshold: config.stream_threshold.unwrap_or(defaults.stream_threshold),
        max_segment_size: config.max_segment_size.unwrap_or(defaults.max_segment_size),
        max_cached_lines: config.max_cached_lines.unwrap_or(defaults.max_cached_lines),
        buffer_lines: config.buffer_lines.unwrap_or(defaults.buffer_lines),
        sample_size: config.sample_size.unwrap_or(defaults.sample_size),
        search_segment_size: config
            .search_segment_size
            .unwrap_or(defaults.search_segment_size),
        max_concurrent_reads: config
            .max_concurrent_reads
            .unwrap_or(defaults.max_concurrent_reads),
        log_file_path: config.log_file_path.unwrap_or(defaults.log_file_path),
    }
}

/// Apply environment variable overrides to resolved config.
///
/// Checks `STREAMVIEW_MAX_SEGMENT_SIZE` and `STREAMVIEW_MAX_CACHED_LINES`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPath`] naming the variable if a value is not a
/// positive integer.
pub fn apply_env_overrides(mut config: ResolvedConfig) -> Result<ResolvedConfig, ConfigError> {
    if let Some(size) = env_number::<u64>(MAX_SEGMENT_SIZE_ENV_VAR)? {
        config.max_segment_size = size;
    }
    if let Some(lines) = env_number::<usize>(MAX_CACHED_LINES_ENV_VAR)? {
        config.max_cached_lines = lines;
    }
    Ok(config)
}

fn env_number<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value != T::default() => Ok(Some(value)),
        _ => Err(ConfigError::InvalidPath(format!(
            "{name} must be a positive integer, got {raw:?}"
        ))),
    }
}

/// Apply CLI argument overrides to resolved config.
///
/// CLI args have the highest precedence and override all other sources.
/// Only applies overrides for flags that were explicitly set by the user.
///
/// Precedence chain: Defaults → Config File → Env Vars → CLI Args (highest)
pub fn apply_cli_overrides(
    mut config: ResolvedConfig,
    max_segment_size: Option<u64>,
    max_cached_lines: Option<usize>,
) -> ResolvedConfig {
    if let Some(size) = max_segment_size {
        config.max_segment_size = size;
    }
    if let Some(lines) = max_cached_lines {
        config.max_cached_lines = lines;
    }
    config
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
