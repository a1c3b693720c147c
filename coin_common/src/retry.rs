//! Fixed-attempt retrying call shared by every outbound client.
//!
//! Each client owns a `RetryPolicy` and passes a classification function with
//! every call. A failure classified `Terminal` is returned at once; a
//! `Retryable` failure is retried after a fixed pause until the attempt
//! ceiling is reached, after which the last failure is returned wrapped in
//! `DailyError::Exhausted`.
//!
//! The pause goes through the `Pause` seam. In production that is the
//! process `StopToken`, so a stop request cuts a pending wait short and the
//! call returns `DailyError::Cancelled`.

use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};

use crate::error::DailyError;
use crate::result::Result;

/// Attempt ceiling for every outbound call.
pub const MAX_ATTEMPTS: u32 = 3;
/// Pause between two attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(10);

/// How a failed attempt is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Try again after the pause.
    Retryable,
    /// Give up immediately.
    Terminal,
}

/// Blocking wait between attempts.
pub trait Pause: Send + Sync {
    /// Wait for `delay`. Returns `false` when the wait was interrupted by a stop.
    fn pause(&self, delay: Duration) -> bool;
}

/// Classifier that retries every failure.
pub fn retry_all(_: &DailyError) -> Verdict {
    Verdict::Retryable
}

/// Attempt ceiling, fixed delay and the pause used between attempts.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    pause: Arc<dyn Pause>,
}

impl RetryPolicy {
    /// The standard policy: `MAX_ATTEMPTS` attempts, `RETRY_DELAY` apart.
    pub fn new(pause: Arc<dyn Pause>) -> Self {
        Self::with_limits(MAX_ATTEMPTS, RETRY_DELAY, pause)
    }

    /// A policy with custom limits. At least one attempt is always made.
    pub fn with_limits(max_attempts: u32, delay: Duration, pause: Arc<dyn Pause>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            pause,
        }
    }

    /// Attempt ceiling.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds, fails terminally, or runs out of attempts.
    ///
    /// `op` receives the 1-based attempt number. `label` names the call in logs.
    pub fn run<T, F, C>(&self, label: &str, mut op: F, classify: C) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
        C: Fn(&DailyError) -> Verdict,
    {
        let mut attempt = 1;
        loop {
            let err = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if classify(&err) == Verdict::Terminal {
                error!("{} failed with a terminal error, not retrying: {}", label, err);
                return Err(err);
            }

            if attempt >= self.max_attempts {
                error!("{} failed after {} attempts: {}", label, attempt, err);
                return Err(DailyError::Exhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            warn!(
                "{} failed (attempt {}/{}): {}, retrying in {:?}",
                label, attempt, self.max_attempts, err, self.delay
            );
            if !self.pause.pause(self.delay) {
                warn!("{} retry abandoned: stop requested", label);
                return Err(DailyError::Cancelled {
                    source: Box::new(err),
                });
            }
            attempt += 1;
        }
    }
}
