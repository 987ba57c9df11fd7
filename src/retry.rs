//! Bounded retry for transient tracker failures.
//!
//! Only issue creation and attachment upload are retried. The policy is a
//! fixed number of attempts with a fixed pause in between: no jitter and no
//! exponential growth.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use tracing::warn;

/// Default number of attempts per call
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Default pause between attempts
pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1)
    pub max_attempts: u32,
    /// Pause between two attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Policy that tries exactly once.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Call `op` until it succeeds or attempts run out, returning the last error.
    ///
    /// `op` receives the 1-based attempt number. `label` names the call in logs.
    pub fn run<T, E, F>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    warn!(
                        call = label,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        call = label,
                        attempt,
                        error = %e,
                        "giving up after {} attempts", attempts
                    );
                    return Err(e);
                }
            }
        }
    }
}
