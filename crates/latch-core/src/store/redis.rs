//! Redis-backed lock store.
//!
//! Each contract operation is exactly one round trip and one atomic server-side
//! step:
//!
//! | Operation | Redis |
//! |-----------|-------|
//! | `try_set` | `SET key token NX PX ttl` |
//! | `compare_and_delete` | Lua: `GET` + `DEL` if equal |
//! | `compare_and_expire` | Lua: `GET` + `PEXPIRE` if equal |
//!
//! Scripts are sent with `EVALSHA` and fall back to `EVAL` on `NOSCRIPT`, which
//! `redis::Script` handles.
//!
//! The connection is a [`ConnectionManager`]: a single multiplexed connection
//! that is cheap to clone, safe to use from many tasks at once, and reconnects
//! after failures. Every command is bounded by `command_timeout`, independent
//! of any lock TTL, so an unreachable server surfaces as `Error::Store`
//! instead of a hang.
//!
//! ## Consistency
//!
//! Mutual exclusion is strong on a single Redis instance. With replication,
//! a lock written to a primary that fails over before replicating can be lost.

use std::future::Future;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{Client, RedisResult, Script};
use async_trait::async_trait;

use super::{LockStore, MIN_TTL};
use crate::error::{Error, Result};

/// Default Redis URL.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default namespace prepended to every lock key.
pub const DEFAULT_KEY_PREFIX: &str = "latch:";

/// Default upper bound on a single store command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

const COMPARE_AND_DELETE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

const COMPARE_AND_EXPIRE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
";

/// Connection settings for [`RedisStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisStoreConfig {
    /// Redis connection URL (`redis://` or `rediss://`).
    pub url: String,
    /// Namespace prepended to every lock key.
    pub key_prefix: String,
    /// Upper bound on any single command, including connection setup.
    pub command_timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl RedisStoreConfig {
    /// Creates a config for `url` with default prefix and timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets the key namespace.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// [`LockStore`] over a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: String,
    command_timeout: Duration,
    compare_and_delete: Script,
    compare_and_expire: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("key_prefix", &self.key_prefix)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the URL is invalid, or the initial connection
    /// fails or does not complete within `command_timeout`.
    pub async fn connect(config: &RedisStoreConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| Error::store_with_source("invalid redis url", e))?;

        let conn = bounded(
            config.command_timeout,
            "connect",
            ConnectionManager::new(client),
        )
        .await?;

        tracing::debug!(prefix = %config.key_prefix, "connected to redis lock store");

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
            command_timeout: config.command_timeout,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
            compare_and_expire: Script::new(COMPARE_AND_EXPIRE),
        })
    }

    /// Returns the namespaced Redis key for a lock key.
    #[must_use]
    pub fn namespaced(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

/// Runs a Redis future under a timeout and maps both failure kinds to
/// `Error::Store`.
async fn bounded<T, F>(timeout: Duration, op: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = RedisResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Error::store_with_source(format!("redis {op} failed"), e)),
        Err(_) => Err(Error::store(format!(
            "redis {op} timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

/// Converts a TTL to whole milliseconds, never below [`MIN_TTL`].
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.max(MIN_TTL).as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl LockStore for RedisStore {
    async fn try_set(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(self.namespaced(key))
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl));

        // Nil reply means the key already existed.
        let reply: Option<String> =
            bounded(self.command_timeout, "SET NX", cmd.query_async(&mut conn)).await?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let mut invocation = self.compare_and_delete.key(self.namespaced(key));
        invocation.arg(token);

        let deleted: i64 = bounded(
            self.command_timeout,
            "compare-and-delete",
            invocation.invoke_async(&mut conn),
        )
        .await?;
        Ok(deleted == 1)
    }

    async fn compare_and_expire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let mut invocation = self.compare_and_expire.key(self.namespaced(key));
        invocation.arg(token).arg(ttl_millis(ttl));

        let updated: i64 = bounded(
            self.command_timeout,
            "compare-and-expire",
            invocation.invoke_async(&mut conn),
        )
        .await?;
        Ok(updated == 1)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let mut cmd = ::redis::cmd("GET");
        cmd.arg(self.namespaced(key));

        bounded(self.command_timeout, "GET", cmd.query_async(&mut conn)).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn.clone();
        let mut cmd = ::redis::cmd("PTTL");
        cmd.arg(self.namespaced(key));

        // -2: no such key, -1: key without expiry (never written by latch).
        let millis: i64 = bounded(self.command_timeout, "PTTL", cmd.query_async(&mut conn)).await?;
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut cmd = ::redis::cmd("DEL");
        cmd.arg(self.namespaced(key));

        let _removed: i64 =
            bounded(self.command_timeout, "DEL", cmd.query_async(&mut conn)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_rounded_up_to_one_millisecond() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_millis(1500)), 1500);
    }

    #[test]
    fn config_builder_overrides_defaults() {
        let config = RedisStoreConfig::new("redis://cache:6380")
            .with_key_prefix("jobs:")
            .with_command_timeout(Duration::from_millis(250));

        assert_eq!(config.url, "redis://cache:6380");
        assert_eq!(config.key_prefix, "jobs:");
        assert_eq!(config.command_timeout, Duration::from_millis(250));
    }

    #[test]
    fn scripts_compare_before_mutating() {
        assert!(COMPARE_AND_DELETE.contains("== ARGV[1]"));
        assert!(COMPARE_AND_DELETE.contains("DEL"));
        assert!(COMPARE_AND_EXPIRE.contains("PEXPIRE"));
    }

    #[tokio::test]
    async fn stalled_command_times_out_as_store_error() {
        let started = std::time::Instant::now();

        let err = bounded(
            Duration::from_millis(20),
            "SET NX",
            std::future::pending::<RedisResult<()>>(),
        )
        .await
        .expect_err("pending command must time out");

        assert!(err.is_store());
        assert_eq!(err.to_string(), "store error: redis SET NX timed out after 20ms");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn invalid_url_is_a_store_error() {
        let config = RedisStoreConfig::new("not a url");
        let err = RedisStore::connect(&config).await.expect_err("must fail");
        assert!(err.is_store());
    }
}
