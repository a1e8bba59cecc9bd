//! CLI command implementations.
//!
//! Each command takes an already-connected [`Locker`](latch_core::Locker) and
//! returns the process exit code, so commands run against any store.

pub mod acquire;
pub mod release;
pub mod run;
pub mod status;

use std::time::Duration;

use clap::Args;
use latch_core::{FailurePolicy, LatchConfig, RetryPolicy};

/// Retry flags shared by commands that acquire.
#[derive(Debug, Clone, Default, Args)]
pub struct PolicyArgs {
    /// Retries after the first attempt (default: `LATCH_RETRY_TIMES`).
    #[arg(long)]
    pub retries: Option<u32>,

    /// Delay between attempts in milliseconds (default: `LATCH_RETRY_DELAY_MS`).
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Make exactly one attempt.
    #[arg(long, conflicts_with = "retries")]
    pub fail_fast: bool,
}

impl PolicyArgs {
    /// Resolves the flags against configured defaults.
    #[must_use]
    pub fn policy(&self, config: &LatchConfig) -> RetryPolicy {
        if self.fail_fast {
            return RetryPolicy::fail_fast();
        }
        if self.retries.is_none() && self.delay_ms.is_none() {
            return config.default_policy();
        }
        FailurePolicy::Continue.resolve(
            self.retries.unwrap_or(config.retry_times),
            self.delay_ms
                .map_or(config.retry_delay, Duration::from_millis),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flags_uses_configured_policy() {
        let config = LatchConfig {
            fail_action: FailurePolicy::FailFast,
            ..LatchConfig::default()
        };
        assert_eq!(PolicyArgs::default().policy(&config), RetryPolicy::fail_fast());
    }

    #[test]
    fn flags_override_configured_values() {
        let args = PolicyArgs {
            retries: Some(2),
            delay_ms: Some(10),
            fail_fast: false,
        };
        assert_eq!(
            args.policy(&LatchConfig::default()),
            RetryPolicy::new(2, Duration::from_millis(10))
        );
    }

    #[test]
    fn fail_fast_flag_wins() {
        let args = PolicyArgs {
            retries: None,
            delay_ms: Some(500),
            fail_fast: true,
        };
        assert!(args.policy(&LatchConfig::default()).is_fail_fast());
    }
}
