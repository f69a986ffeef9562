//! Viewport state machine and the pieces it coordinates.
//!
//! - `controller`: [`VirtualViewportController`], the single owner of viewport state
//! - `recovery`: [`ErrorRecoveryPolicy`], one fallback attempt for transient failures
//! - `collaborators`: traits the host implements (display, progress, error dialog)

pub mod collaborators;
pub mod controller;
pub mod recovery;

pub use collaborators::{
    DisplayEvent, DisplaySurface, ErrorDecision, ErrorDialog, IgnoreErrors, NullDisplay,
    ProgressSink,
};
pub use controller::{
    Collaborators, ControllerMessage, ControllerState, DisplaySubscription, RequestOutcome,
    ViewportConfig, VirtualViewportController,
};
pub use recovery::{
    ErrorRecoveryPolicy, RecoverableError, RecoveryError, SuggestedAction,
};
