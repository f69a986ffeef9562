//! Cooperative cancellation shared between a requester and its worker.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const ACTIVE: u8 = 0;
const SUPERSEDED: u8 = 1;
const USER: u8 = 2;

/// Shared cancellation flag.
///
/// Clones observe the same flag. Workers poll [`is_cancelled`](Self::is_cancelled) at
/// safe points and stop without producing a result. The token remembers *why* it was
/// cancelled: a supersede (a newer request replaced this one) stays silent, while a
/// user cancel is reported back as [`ViewerError::Cancelled`](crate::model::ViewerError).
///
/// The first cancellation wins; a later call does not change the recorded reason.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<AtomicU8>,
}

impl CancelToken {
    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel because a newer request replaced this one.
    pub fn cancel(&self) {
        let _ = self
            .state
            .compare_exchange(ACTIVE, SUPERSEDED, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Cancel on explicit user request.
    pub fn cancel_by_user(&self) {
        let _ = self
            .state
            .compare_exchange(ACTIVE, USER, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Whether any cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) != ACTIVE
    }

    /// Whether the cancellation came from the user.
    pub fn is_user_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == USER
    }
}
