//! Backing store abstraction for lock entries.
//!
//! The lock's correctness rests entirely on the store: every method on
//! [`LockStore`] must be a single atomic operation on the store side. A
//! check-then-act split across two round trips (for example `GET` followed by
//! `DEL`) lets an entry expire and be reclaimed by another holder in between,
//! after which the wrong holder's lock gets dropped.
//!
//! Implementations:
//!
//! - [`MemoryStore`]: in-process, for tests and single-process use
//! - [`RedisStore`]: `SET NX PX` plus server-side scripts over a multiplexed
//!   connection
//!
//! Store failures are returned as `Error::Store`. A conditional operation that
//! simply does not apply (key held, token mismatch) is `Ok(false)`, never an
//! error.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Shortest TTL any store writes; shorter requests are rounded up to it.
pub const MIN_TTL: Duration = Duration::from_millis(1);

pub use self::memory::MemoryStore;
pub use self::redis::{RedisStore, RedisStoreConfig};

/// Atomic primitives a distributed lock needs from its store.
///
/// Implementations must be safe to share between many concurrently acquiring
/// tasks without mixing up request/response pairs.
#[async_trait]
pub trait LockStore: Send + Sync + 'static {
    /// Creates `key = token` with the given time to live, only if `key` is
    /// absent (or expired). A TTL below [`MIN_TTL`] is written as `MIN_TTL`.
    ///
    /// Returns true iff this call created the entry.
    async fn try_set(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Deletes `key` only if its current value equals `token`.
    ///
    /// Returns true iff this call deleted the entry.
    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool>;

    /// Resets the time to live of `key` only if its current value equals
    /// `token`. The value itself is never rewritten.
    ///
    /// Returns true iff the expiry was updated.
    async fn compare_and_expire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Reads the token currently stored under `key`.
    ///
    /// Returns `None` if there is no live entry.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Returns the remaining time to live of `key`.
    ///
    /// Returns `None` if there is no live entry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Unconditionally deletes `key`.
    ///
    /// Succeeds even if the key does not exist. Intended for operator
    /// recovery only; normal release goes through
    /// [`compare_and_delete`](Self::compare_and_delete).
    async fn delete(&self, key: &str) -> Result<()>;
}
