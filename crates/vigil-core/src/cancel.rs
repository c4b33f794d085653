// crates/vigil-core/src/cancel.rs
//
// Cooperative cancellation for the pipeline.
//
// One token per pipeline: the supervisor owns the root token and every stage
// holds a clone. `cancel()` is a one-way latch — once set it never clears,
// and every waiter is woken exactly once by the broadcast. The ingest stage
// creates separate child tokens for the recorder and re-broadcast stages it
// spawns, and cancels them when it exits.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Cloneable handle to a shared cancellation latch.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: Mutex<bool>,
    cond:      Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: Mutex::new(false),
                cond:      Condvar::new(),
            }),
        }
    }

    /// Latch the token. Idempotent; wakes every blocked `wait*` call.
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        if !*cancelled {
            *cancelled = true;
            self.inner.cond.notify_all();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Block until the token is cancelled. Returns immediately if it already is.
    pub fn wait(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            self.inner.cond.wait(&mut cancelled);
        }
    }

    /// Block until cancelled or `timeout` elapses. Returns whether the token
    /// is cancelled — callers use this as a pollable sleep in stage loops.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut cancelled = self.inner.cancelled.lock();
        if *cancelled {
            return true;
        }
        self.inner.cond.wait_for(&mut cancelled, timeout);
        *cancelled
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn starts_uncancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn clones_observe_cancel() {
        let token = CancelToken::new();
        let observer = token.clone();
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn wait_returns_after_cross_thread_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = thread::spawn(move || waiter.wait());
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn wait_returns_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        token.wait();
        assert!(token.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn wait_timeout_expires_when_not_cancelled() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
