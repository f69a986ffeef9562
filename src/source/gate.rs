//! Bounded concurrency gate for segment reads.
//!
//! The viewport loader and the search engine read the same file independently. Each
//! read holds a permit for its duration so that at most `limit` segment buffers are
//! alive at once, whatever mix of viewport loads and search steps is running.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

use super::cancel::CancelToken;

/// How often a blocked acquirer re-checks its cancel token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Counting semaphore over concurrent reads.
#[derive(Debug)]
pub struct ReadGate {
    limit: usize,
    in_use: Mutex<usize>,
    released: Condvar,
}

impl ReadGate {
    /// Create a gate admitting `limit` concurrent readers (at least one).
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            in_use: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    /// Maximum number of concurrent permits.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits currently held.
    pub fn in_use(&self) -> usize {
        *self.in_use.lock()
    }

    /// Block until a permit is available.
    ///
    /// Returns `None` if `cancel` fires while waiting.
    pub fn acquire(&self, cancel: &CancelToken) -> Option<ReadPermit<'_>> {
        let mut in_use = self.in_use.lock();
        while *in_use >= self.limit {
            if cancel.is_cancelled() {
                return None;
            }
            self.released.wait_for(&mut in_use, CANCEL_POLL_INTERVAL);
        }
        if cancel.is_cancelled() {
            return None;
        }
        *in_use += 1;
        Some(ReadPermit { gate: self })
    }
}

/// RAII permit; releases its slot on drop.
#[derive(Debug)]
pub struct ReadPermit<'a> {
    gate: &'a ReadGate,
}

impl Drop for ReadPermit<'_> {
    fn drop(&mut self) {
        let mut in_use = self.gate.in_use.lock();
        *in_use = in_use.saturating_sub(1);
        self.gate.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn zero_limit_is_raised_to_one() {
        assert_eq!(ReadGate::new(0).limit(), 1);
    }

    #[test]
    fn permits_are_released_on_drop() {
        let gate = ReadGate::new(2);
        let token = CancelToken::new();
        let a = gate.acquire(&token).expect("first permit");
        let b = gate.acquire(&token).expect("second permit");
        assert_eq!(gate.in_use(), 2);
        drop(a);
        assert_eq!(gate.in_use(), 1);
        drop(b);
        assert_eq!(gate.in_use(), 0);
    }

    #[test]
    fn cancelled_waiter_gives_up() {
        let gate = Arc::new(ReadGate::new(1));
        let holder_token = CancelToken::new();
        let _held = gate.acquire(&holder_token).expect("permit");

        let waiter_token = CancelToken::new();
        let waiter_gate = Arc::clone(&gate);
        let waiter_cancel = waiter_token.clone();
        let handle = thread::spawn(move || waiter_gate.acquire(&waiter_cancel).is_none());

        thread::sleep(Duration::from_millis(50));
        waiter_token.cancel();

        assert!(handle.join().expect("waiter thread"), "waiter should give up");
        assert_eq!(gate.in_use(), 1);
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let gate = Arc::new(ReadGate::new(1));
        let token = CancelToken::new();
        let held = gate.acquire(&token).expect("permit");

        let waiter_gate = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            let token = CancelToken::new();
            waiter_gate.acquire(&token).is_some()
        });

        thread::sleep(Duration::from_millis(30));
        drop(held);

        assert!(handle.join().expect("waiter thread"));
    }

    #[test]
    fn already_cancelled_token_gets_no_permit() {
        let gate = ReadGate::new(4);
        let token = CancelToken::new();
        token.cancel();
        assert!(gate.acquire(&token).is_none());
        assert_eq!(gate.in_use(), 0);
    }
}
