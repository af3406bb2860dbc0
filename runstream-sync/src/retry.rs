//! Fixed-backoff retry.
//!
//! Backoff is constant, not exponential.

use std::fmt;
use std::time::Duration;

use runstream_core::Clock;

/// Pause between failed attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub attempts: u32,
    pub backoff: Duration,
}

/// All attempts failed; carries the last error.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last: E,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} attempt(s): {}", self.attempts, self.last)
    }
}

impl RetryPolicy {
    /// `attempts` below 1 is raised to 1: the operation always runs once.
    pub fn fixed(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Run `op` until it succeeds or the attempts run out. `op` receives the
    /// 1-based attempt number. No sleep follows the final failure.
    pub fn run<T, E, F>(&self, clock: &dyn Clock, what: &str, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        E: fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= attempts => {
                    tracing::error!(what, attempt, attempts, error = %err, "final attempt failed");
                    return Err(RetryExhausted { attempts, last: err });
                }
                Err(err) => {
                    tracing::warn!(
                        what,
                        attempt,
                        attempts,
                        error = %err,
                        backoff_secs = self.backoff.as_secs(),
                        "attempt failed, retrying"
                    );
                    clock.sleep(self.backoff);
                    attempt += 1;
                }
            }
        }
    }
}
