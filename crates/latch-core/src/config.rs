//! Process-wide lock configuration.
//!
//! Loaded once at startup from the environment and immutable afterwards.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `LATCH_REDIS_URL` | `redis://127.0.0.1:6379` |
//! | `LATCH_KEY_PREFIX` | `latch:` |
//! | `LATCH_LOCK_TTL_MS` | `30000` |
//! | `LATCH_RETRY_TIMES` | `5` |
//! | `LATCH_RETRY_DELAY_MS` | `100` |
//! | `LATCH_FAIL_ACTION` | `continue` |
//! | `LATCH_COMMAND_TIMEOUT_MS` | `2000` |

use std::time::Duration;

use crate::error::{Error, Result};
use crate::lock::DEFAULT_LOCK_TTL;
use crate::policy::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, FailurePolicy, RetryPolicy};
use crate::store::RedisStoreConfig;
use crate::store::redis::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_KEY_PREFIX, DEFAULT_REDIS_URL};

const ENV_REDIS_URL: &str = "LATCH_REDIS_URL";
const ENV_KEY_PREFIX: &str = "LATCH_KEY_PREFIX";
const ENV_LOCK_TTL_MS: &str = "LATCH_LOCK_TTL_MS";
const ENV_RETRY_TIMES: &str = "LATCH_RETRY_TIMES";
const ENV_RETRY_DELAY_MS: &str = "LATCH_RETRY_DELAY_MS";
const ENV_FAIL_ACTION: &str = "LATCH_FAIL_ACTION";
const ENV_COMMAND_TIMEOUT_MS: &str = "LATCH_COMMAND_TIMEOUT_MS";

/// Lock defaults and store connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatchConfig {
    /// Redis connection URL.
    pub redis_url: String,
    /// Namespace prepended to every lock key in the store.
    pub key_prefix: String,
    /// TTL for new lock entries.
    pub lock_ttl: Duration,
    /// Retries after the first attempt when the failure policy is `Continue`.
    pub retry_times: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
    /// What contention means for callers that do not choose explicitly.
    pub fail_action: FailurePolicy,
    /// Upper bound on a single store command.
    pub command_timeout: Duration,
}

impl Default for LatchConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            lock_ttl: DEFAULT_LOCK_TTL,
            retry_times: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            fail_action: FailurePolicy::default(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl LatchConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if any variable is set to a malformed
    /// value.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads configuration with a custom environment source.
    ///
    /// This entry point is test-friendly and accepts a key lookup function.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if any variable is set to a malformed
    /// value.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = env_string(&get_env, ENV_REDIS_URL) {
            config.redis_url = url;
        }
        // An explicitly empty prefix is allowed and disables namespacing.
        if let Some(prefix) = get_env(ENV_KEY_PREFIX) {
            config.key_prefix = prefix.trim().to_string();
        }
        if let Some(ms) = parse_u64(&get_env, ENV_LOCK_TTL_MS, true)? {
            config.lock_ttl = Duration::from_millis(ms);
        }
        if let Some(times) = parse_u64(&get_env, ENV_RETRY_TIMES, false)? {
            config.retry_times = u32::try_from(times).map_err(|_| {
                Error::configuration(format!(
                    "{ENV_RETRY_TIMES} value {times} exceeds supported range"
                ))
            })?;
        }
        if let Some(ms) = parse_u64(&get_env, ENV_RETRY_DELAY_MS, false)? {
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(action) = env_string(&get_env, ENV_FAIL_ACTION) {
            config.fail_action = action.parse().map_err(|_| {
                Error::configuration(format!(
                    "{ENV_FAIL_ACTION} must be 'continue' or 'fail-fast', got '{action}'"
                ))
            })?;
        }
        if let Some(ms) = parse_u64(&get_env, ENV_COMMAND_TIMEOUT_MS, true)? {
            config.command_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Retry policy for the configured failure action.
    #[must_use]
    pub const fn default_policy(&self) -> RetryPolicy {
        self.policy_for(self.fail_action)
    }

    /// Retry policy for an explicitly chosen failure action.
    #[must_use]
    pub const fn policy_for(&self, action: FailurePolicy) -> RetryPolicy {
        action.resolve(self.retry_times, self.retry_delay)
    }

    /// Store connection settings derived from this config.
    #[must_use]
    pub fn redis_store_config(&self) -> RedisStoreConfig {
        RedisStoreConfig::new(self.redis_url.clone())
            .with_key_prefix(self.key_prefix.clone())
            .with_command_timeout(self.command_timeout)
    }
}

fn env_string<F>(get_env: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    get_env(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_u64<F>(get_env: &F, key: &str, positive: bool) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = env_string(get_env, key) else {
        return Ok(None);
    };

    let parsed = raw.parse::<u64>().map_err(|_| {
        Error::configuration(format!("{key} must be a non-negative integer, got '{raw}'"))
    })?;
    if positive && parsed == 0 {
        return Err(Error::configuration(format!(
            "{key} must be greater than zero"
        )));
    }
    Ok(Some(parsed))
}
