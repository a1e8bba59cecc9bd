//! Retry and failure policies.
//!
//! The acquisition engine only understands a [`RetryPolicy`]: how many extra
//! attempts to make after the first one and how long to wait between them.
//! [`FailurePolicy`] is the caller-facing choice of what contention should
//! mean, and resolves to a retry policy at the call boundary.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default fixed delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Bounded, fixed-delay retry budget for one acquisition.
///
/// `max_retries` counts attempts after the first, so a policy with
/// `max_retries = N` makes at most `N + 1` attempts. Zero means a single
/// attempt that fails immediately on contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one.
    pub max_retries: u32,
    /// Wait between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Creates a retry policy.
    #[must_use]
    pub const fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Policy that makes exactly one attempt.
    #[must_use]
    pub const fn fail_fast() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    /// Total attempts this policy allows, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u64 {
        self.max_retries as u64 + 1
    }

    /// Upper bound on time spent sleeping between attempts.
    #[must_use]
    pub fn max_wait(&self) -> Duration {
        self.delay.saturating_mul(self.max_retries)
    }

    /// Returns true if contention fails without any retry.
    #[must_use]
    pub const fn is_fail_fast(&self) -> bool {
        self.max_retries == 0
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY)
    }
}

/// What a caller wants to happen when the lock is already held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Give up after the first contended attempt.
    FailFast,
    /// Keep trying with the configured retry count and delay.
    #[default]
    Continue,
}

impl FailurePolicy {
    /// Resolves this mode against configured retry parameters.
    ///
    /// Fail-fast always resolves to one attempt, whatever `retry_times` is.
    #[must_use]
    pub const fn resolve(self, retry_times: u32, delay: Duration) -> RetryPolicy {
        match self {
            Self::FailFast => RetryPolicy::fail_fast(),
            Self::Continue => RetryPolicy::new(retry_times, delay),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => f.write_str("fail-fast"),
            Self::Continue => f.write_str("continue"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-fast" | "fail_fast" | "give-up" | "give_up" | "giveup" => Ok(Self::FailFast),
            "continue" | "retry" => Ok(Self::Continue),
            other => Err(Error::configuration(format!(
                "unknown failure policy '{other}' (expected 'continue' or 'fail-fast')"
            ))),
        }
    }
}
