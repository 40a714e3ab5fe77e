//! Shutdown coordination between callers and the event loop.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::error::{Error, Result};

/// Event loop state as derived from the lifecycle flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Accepting submissions and processing transfers.
    Active,
    /// Shutdown requested, finishing in-flight transfers.
    Draining,
    /// Shutdown requested and nothing left in flight.
    Stopped,
    /// The loop hit a fatal error and abandoned its transfers.
    Failed,
}

impl LoopState {
    /// The worker thread exits once this is true.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Stopped | LoopState::Failed)
    }
}

/// Shared admission gate, keep-running flag and in-flight accounting.
///
/// Submitters hold the gate's read lock while they increment the in-flight
/// counter and hand the request to the worker. Closing the gate takes the
/// write lock, so once `shutdown` returns no new request can be counted and
/// the worker's exit check cannot miss one.
#[derive(Debug)]
pub struct Lifecycle {
    accepting: RwLock<bool>,
    running: AtomicBool,
    failed: AtomicBool,
    /// Accepted and not yet completed.
    in_flight: AtomicUsize,
    /// Descriptors in the worker's registry.
    registered: AtomicUsize,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            accepting: RwLock::new(true),
            running: AtomicBool::new(true),
            failed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            registered: AtomicUsize::new(0),
        }
    }

    /// Count a new request and run `submit` while the gate is held open.
    ///
    /// Fails with `ShuttingDown` once the gate is closed. If `submit` fails
    /// the count is restored.
    pub fn admit<T>(&self, submit: impl FnOnce() -> Result<T>) -> Result<T> {
        let accepting = self.accepting.read().unwrap_or_else(|p| p.into_inner());
        if !*accepting {
            return Err(Error::ShuttingDown);
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        submit().inspect_err(|_| {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        })
    }

    /// Stop accepting requests and let the loop drain.
    pub fn trigger(&self) {
        self.close();
        self.running.store(false, Ordering::SeqCst);
    }

    /// Mark the loop as failed. Also closes the gate.
    pub fn fail(&self) {
        self.close();
        self.failed.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    fn close(&self) {
        *self.accepting.write().unwrap_or_else(|p| p.into_inner()) = false;
    }

    pub fn is_accepting(&self) -> bool {
        *self.accepting.read().unwrap_or_else(|p| p.into_inner())
    }

    /// A request completed.
    pub fn finish_one(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn set_registered(&self, count: usize) {
        self.registered.store(count, Ordering::SeqCst);
    }

    pub fn registered(&self) -> usize {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> LoopState {
        if self.failed.load(Ordering::SeqCst) {
            LoopState::Failed
        } else if self.running.load(Ordering::SeqCst) {
            LoopState::Active
        } else if self.in_flight() > 0 {
            LoopState::Draining
        } else {
            LoopState::Stopped
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_until_triggered() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LoopState::Active);
        lifecycle.trigger();
        assert_eq!(lifecycle.state(), LoopState::Stopped);
        assert!(lifecycle.state().is_terminal());
    }

    #[test]
    fn drains_while_requests_remain() {
        let lifecycle = Lifecycle::new();
        lifecycle.admit(|| Ok(())).unwrap();
        lifecycle.admit(|| Ok(())).unwrap();
        lifecycle.trigger();

        assert_eq!(lifecycle.state(), LoopState::Draining);
        lifecycle.finish_one();
        assert_eq!(lifecycle.state(), LoopState::Draining);
        lifecycle.finish_one();
        assert_eq!(lifecycle.state(), LoopState::Stopped);
    }

    #[test]
    fn closed_gate_rejects_without_counting() {
        let lifecycle = Lifecycle::new();
        lifecycle.trigger();
        let err = lifecycle.admit(|| Ok(())).unwrap_err();
        assert!(matches!(err, Error::ShuttingDown));
        assert_eq!(lifecycle.in_flight(), 0);
        assert!(!lifecycle.is_accepting());
    }

    #[test]
    fn failed_submit_restores_count() {
        let lifecycle = Lifecycle::new();
        let result: Result<()> = lifecycle.admit(|| Err(Error::Abandoned));
        assert!(result.is_err());
        assert_eq!(lifecycle.in_flight(), 0);
    }

    #[test]
    fn failure_is_terminal_and_closes_gate() {
        let lifecycle = Lifecycle::new();
        lifecycle.admit(|| Ok(())).unwrap();
        lifecycle.fail();
        assert_eq!(lifecycle.state(), LoopState::Failed);
        assert!(lifecycle.state().is_terminal());
        assert!(!lifecycle.is_accepting());
    }
}
