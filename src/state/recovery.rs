//! Try-then-fallback for segment loads.

use thiserror::Error;
use tracing::warn;

use crate::model::ViewerError;

/// Runs a primary attempt and, for transient failures only, one fallback.
///
/// Transient means [`ViewerError::is_recoverable`]: I/O failures and memory
/// pressure. Everything else surfaces on the first failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorRecoveryPolicy;

impl ErrorRecoveryPolicy {
    /// Create the policy.
    pub fn new() -> Self {
        Self
    }

    /// Length the fallback attempt should request: half the original, at least 1.
    pub fn fallback_length(length: u64) -> u64 {
        (length / 2).max(1)
    }

    /// Run `primary`, falling back to `fallback` once if it fails recoverably.
    ///
    /// # Errors
    ///
    /// - [`RecoveryError::Fatal`] if `primary` fails non-recoverably.
    /// - [`RecoveryError::Exhausted`] if both attempts fail.
    pub fn run<T, P, F>(&self, primary: P, fallback: F) -> Result<T, RecoveryError>
    where
        P: FnOnce() -> Result<T, ViewerError>,
        F: FnOnce() -> Result<T, ViewerError>,
    {
        match primary() {
            Ok(value) => Ok(value),
            Err(err) if !err.is_recoverable() => Err(RecoveryError::Fatal(err)),
            Err(primary_err) => {
                warn!(error = %primary_err, "Primary load failed, trying fallback");
                fallback().map_err(|fallback_err| RecoveryError::Exhausted {
                    primary: primary_err,
                    fallback: fallback_err,
                })
            }
        }
    }
}

/// Why a recovered operation still failed.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// Failed without a fallback attempt.
    #[error(transparent)]
    Fatal(ViewerError),

    /// Both the primary and the fallback attempt failed.
    #[error("{fallback} (first attempt: {primary})")]
    Exhausted {
        /// Error from the primary attempt.
        primary: ViewerError,
        /// Error from the fallback attempt.
        fallback: ViewerError,
    },
}

impl RecoveryError {
    /// The error that ended the operation.
    pub fn last_error(&self) -> &ViewerError {
        match self {
            Self::Fatal(err) => err,
            Self::Exhausted { fallback, .. } => fallback,
        }
    }

    /// Convert into something a dialog can show.
    pub fn to_recoverable(&self) -> RecoverableError {
        match self {
            Self::Fatal(err) => RecoverableError {
                message: format!("Could not load this part of the file: {err}"),
                actions: vec![SuggestedAction::Retry, SuggestedAction::Abort],
            },
            Self::Exhausted { fallback, .. } => RecoverableError {
                message: format!(
                    "Could not load this part of the file, even with a smaller view: {fallback}"
                ),
                actions: vec![
                    SuggestedAction::Retry,
                    SuggestedAction::UseSmallerView,
                    SuggestedAction::Abort,
                ],
            },
        }
    }
}

/// A user-facing failure with suggested next steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverableError {
    /// Human-readable explanation.
    pub message: String,
    /// What the user can do about it, most useful first.
    pub actions: Vec<SuggestedAction>,
}

/// One suggested response to a [`RecoverableError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestedAction {
    /// Try the same request again.
    Retry,
    /// Shrink the viewport so less data is loaded.
    UseSmallerView,
    /// Give up on this file.
    Abort,
}
