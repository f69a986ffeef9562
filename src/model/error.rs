//! Error types for streamview.
//!
//! This module defines the error taxonomy using `thiserror` for structured error
//! handling. Errors compose via `?` and `From` conversions.
//!
//! # Error Hierarchy
//!
//! - [`AppError`] - Top-level error for the binary, wrapping every domain failure
//!   - [`ViewerError`] - File analysis, segment loading, and search failures
//!   - [`ConfigError`](crate::config::ConfigError) - Config file read/parse failures
//!   - [`LoggingError`](crate::logging::LoggingError) - Tracing setup failures
//!
//! # Recovery Strategy
//!
//! - `NotFound` / `Access` are fatal: the file cannot be viewed at all, so they propagate
//!   straight to the caller without any retry.
//! - `Io` / `MemoryPressure` are transient: the
//!   [`ErrorRecoveryPolicy`](crate::state::ErrorRecoveryPolicy) retries them exactly once
//!   with a smaller segment before surfacing a recoverable error to the user.
//! - `OutOfRange` is a caller bug (invalid position) and is never retried.
//! - `Cancelled` is routine. It is only ever surfaced when the user asked for the
//!   cancellation; a superseded viewport request is dropped silently.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::logging::LoggingError;

/// Top-level application error encompassing all failure modes.
///
/// Returned from the binary's main flow. Domain errors convert via `From`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Failed to analyze, load, or search the viewed file.
    #[error("Viewer error: {0}")]
    Viewer(#[from] ViewerError),

    /// Failed to load the configuration file.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failed to initialize logging.
    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    /// The viewport could not be loaded, even after recovery.
    #[error("Load failed: {0}")]
    Load(String),

    /// Failed to write results.
    #[error("Output error: {0}")]
    Output(#[source] std::io::Error),
}

/// Errors produced by the streaming engine.
///
/// Each variant carries enough context (paths, offsets, sizes) to build a user-facing
/// message without consulting any other state.
#[derive(Debug, Error)]
pub enum ViewerError {
    /// The file does not exist at the given path.
    ///
    /// **When this occurs**: during analysis when the path cannot be found.
    ///
    /// **Recovery**: none. Non-retryable, propagates immediately.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use streamview::model::error::ViewerError;
    ///
    /// let err = ViewerError::NotFound { path: PathBuf::from("/tmp/missing.log") };
    /// assert!(err.to_string().contains("/tmp/missing.log"));
    /// ```
    #[error("File not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// The file exists but cannot be read (permissions, or not a regular file).
    ///
    /// **Recovery**: none. Non-retryable, propagates immediately.
    #[error("Cannot access {path}: {reason}")]
    Access {
        /// The path that could not be accessed.
        path: PathBuf,
        /// Human readable reason (OS message or "is a directory").
        reason: String,
    },

    /// A load was requested at an invalid position.
    ///
    /// Negative start positions and starts at or after EOF are rejected. Oversized
    /// lengths are clamped, never rejected.
    #[error("Position {position} is out of range for a file of {file_size} bytes")]
    OutOfRange {
        /// The requested start position.
        position: i64,
        /// Size of the file in bytes.
        file_size: u64,
    },

    /// Transient read failure.
    ///
    /// **Recovery**: retried once with a smaller segment.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Buffer allocation for a segment failed.
    ///
    /// **Recovery**: retried once with a smaller segment.
    #[error("Not enough memory to load {requested} bytes")]
    MemoryPressure {
        /// Number of bytes that could not be reserved.
        requested: u64,
    },

    /// The operation was cancelled by the user.
    ///
    /// Superseded loads never produce this variant; they return no result instead.
    #[error("Operation cancelled")]
    Cancelled,
}

impl ViewerError {
    /// Whether the error is transient and worth one fallback attempt.
    ///
    /// # Examples
    ///
    /// ```
    /// use streamview::model::error::ViewerError;
    ///
    /// assert!(ViewerError::MemoryPressure { requested: 10 }.is_recoverable());
    /// assert!(!ViewerError::Cancelled.is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::MemoryPressure { .. })
    }
}
