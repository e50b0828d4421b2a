//! wait — one-shot completion with a bounded wait.
//!
//! A worker calls [`Completion::complete`]; a waiter blocks in
//! [`Completion::wait_timeout`] until then or until the timeout. A wait that
//! succeeded but took longer than the warn threshold is logged at error
//! level; it is still a success. There is no cancellation path.

use log::error;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::consts::WAITED_TOO_LONG_MSECS;
use crate::error::{PageError, Result};

pub struct Completion {
    done: Mutex<bool>,
    cv: Condvar,
    warn_after: Duration,
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

impl Completion {
    pub fn new() -> Self {
        Self::with_warn_threshold(Duration::from_millis(WAITED_TOO_LONG_MSECS))
    }

    pub fn with_warn_threshold(warn_after: Duration) -> Self {
        Self {
            done: Mutex::new(false),
            cv: Condvar::new(),
            warn_after,
        }
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Signal completion and wake every waiter.
    pub fn complete(&self) {
        *self.state() = true;
        self.cv.notify_all();
    }

    pub fn is_done(&self) -> bool {
        *self.state()
    }

    /// Arm the completion again.
    pub fn reinit(&self) {
        *self.state() = false;
    }

    /// Block until completed or `timeout` elapses. Returns the time waited.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Duration> {
        let start = Instant::now();
        let guard = self.state();
        let (guard, res) = self
            .cv
            .wait_timeout_while(guard, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        let waited = start.elapsed();
        if res.timed_out() && !*guard {
            return Err(PageError::Timeout {
                waited_ms: waited.as_millis() as u64,
            });
        }
        check_waited(waited, self.warn_after);
        Ok(waited)
    }
}

/// Log a successful wait that took at least `threshold`.
pub fn check_waited(waited: Duration, threshold: Duration) {
    if waited >= threshold {
        error!("function waited {} msecs", waited.as_millis());
    }
}
