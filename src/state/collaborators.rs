//! Interfaces the controller consumes from its host.
//!
//! The controller never reaches for a global display or dialog; whoever builds it
//! passes these in.

use super::recovery::RecoverableError;

/// Where visible text ends up.
pub trait DisplaySurface {
    /// Replace the displayed text with `text` (visible lines joined by `\n`).
    fn set_visible_content(&mut self, text: &str);
}

/// Receives progress for long-running work. Called from worker threads.
pub trait ProgressSink: Send + Sync {
    /// Report `percent` (0 to 100) complete for the task named `label`.
    fn report(&self, percent: u8, label: &str);
}

/// Asks the user what to do about a failed load.
pub trait ErrorDialog {
    /// Present `error` and return the user's choice.
    fn present(&mut self, error: &RecoverableError) -> ErrorDecision;
}

/// User input coming back from the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    /// The user scrolled so that this line is at the top.
    ScrolledTo(u64),
    /// The display now shows this many lines.
    Resized(u64),
}

/// Answer from an [`ErrorDialog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDecision {
    /// Reissue the failed viewport request.
    Retry,
    /// Leave the controller in its error state.
    Ignore,
    /// No answer yet; the host calls `resolve_error` later.
    Deferred,
}

/// Display surface that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl DisplaySurface for NullDisplay {
    fn set_visible_content(&mut self, _text: &str) {}
}

/// Dialog that always ignores errors, leaving them for the host to inspect.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreErrors;

impl ErrorDialog for IgnoreErrors {
    fn present(&mut self, _error: &RecoverableError) -> ErrorDecision {
        ErrorDecision::Ignore
    }
}
