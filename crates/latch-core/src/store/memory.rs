//! In-memory lock store.
//!
//! [`MemoryStore`] keeps entries in a `RwLock<HashMap>` and expires them lazily
//! against the Tokio clock, so tests can pause and advance time.
//!
//! ## Limitations
//!
//! - **Single-process only**: entries are not visible to other processes
//! - **No persistence**: all entries are lost when the store is dropped
//! - **Lazy cleanup**: expired entries stay in the map until their key is
//!   touched again, or until `try_set` finds at least
//!   [`PURGE_THRESHOLD`] entries and sweeps all expired ones

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{LockStore, MIN_TTL};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct Entry {
    token: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Thread-safe in-memory [`LockStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

/// Map size at which `try_set` sweeps expired entries.
pub const PURGE_THRESHOLD: usize = 1024;

/// Rounds up to [`MIN_TTL`] and saturates for TTLs beyond the clock's range.
fn expiry(now: Instant, ttl: Duration) -> Instant {
    let ttl = ttl.max(MIN_TTL);
    now.checked_add(ttl)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365 * 30))
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::store("memory store lock poisoned")
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn live_entries(&self) -> Result<usize> {
        let now = Instant::now();
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries.values().filter(|e| e.is_live(now)).count())
    }

    /// Drops expired entries and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(poison_err)?;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok(before - entries.len())
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn try_set(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(poison_err)?;

        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        if entries.len() >= PURGE_THRESHOLD {
            entries.retain(|_, e| e.is_live(now));
        }

        entries.insert(
            key.to_string(),
            Entry {
                token: token.to_string(),
                expires_at: expiry(now, ttl),
            },
        );
        drop(entries);
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(poison_err)?;

        let (live, owned) = match entries.get(key) {
            Some(entry) => (entry.is_live(now), entry.token == token),
            None => return Ok(false),
        };

        if !live {
            entries.remove(key);
            return Ok(false);
        }
        if !owned {
            return Ok(false);
        }

        entries.remove(key);
        drop(entries);
        Ok(true)
    }

    async fn compare_and_expire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(poison_err)?;

        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) && entry.token == token => {
                entry.expires_at = expiry(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.token.clone()))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().map_err(poison_err)?.remove(key);
        Ok(())
    }
}
