//! Test lock store with operation tracing.
//!
//! Wraps [`MemoryStore`] and records every call so tests can assert on how
//! many round trips an acquisition made and which operations it used.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use latch_core::error::{Error, Result};
use latch_core::store::{LockStore, MemoryStore};

/// Record of a store operation for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Set-if-absent.
    TrySet {
        /// Key that was written.
        key: String,
        /// Token offered.
        token: String,
        /// Requested TTL.
        ttl: Duration,
    },
    /// Ownership-checked delete.
    CompareAndDelete {
        /// Key targeted.
        key: String,
        /// Token expected.
        token: String,
    },
    /// Ownership-checked TTL refresh.
    CompareAndExpire {
        /// Key targeted.
        key: String,
        /// Token expected.
        token: String,
        /// New TTL.
        ttl: Duration,
    },
    /// Read of the current token.
    Get {
        /// Key read.
        key: String,
    },
    /// Read of the remaining TTL.
    Ttl {
        /// Key read.
        key: String,
    },
    /// Unconditional delete.
    Delete {
        /// Key deleted.
        key: String,
    },
}

impl StoreOp {
    /// Returns the key the operation touched.
    pub fn key(&self) -> &str {
        match self {
            Self::TrySet { key, .. }
            | Self::CompareAndDelete { key, .. }
            | Self::CompareAndExpire { key, .. }
            | Self::Get { key }
            | Self::Ttl { key }
            | Self::Delete { key } => key,
        }
    }

    /// Returns true for `TrySet`.
    pub const fn is_try_set(&self) -> bool {
        matches!(self, Self::TrySet { .. })
    }
}

/// In-memory lock store with operation tracing and failure injection.
///
/// Clones share state, so a test can keep one clone for assertions and hand
/// another to the code under test.
#[derive(Debug, Clone, Default)]
pub struct TracingMemoryStore {
    inner: Arc<MemoryStore>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_keys: Arc<Mutex<Vec<String>>>,
    contended_keys: Arc<Mutex<Vec<String>>>,
    unavailable: Arc<AtomicBool>,
    latency: Option<Duration>,
}

impl TracingMemoryStore {
    /// Creates a new empty tracing store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that sleeps `latency` before every operation.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Returns how many `try_set` calls were made for `key`.
    #[must_use]
    pub fn try_set_count(&self, key: &str) -> usize {
        self.operations
            .lock()
            .expect("lock")
            .iter()
            .filter(|op| op.is_try_set() && op.key() == key)
            .count()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Makes every operation on keys starting with `prefix` fail.
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        self.fail_keys.lock().expect("lock").push(prefix.into());
    }

    /// Makes `try_set` report an existing holder for keys starting with
    /// `prefix`, without any entry being written.
    pub fn force_contention(&self, prefix: impl Into<String>) {
        self.contended_keys.lock().expect("lock").push(prefix.into());
    }

    /// Clears all injected failures and forced contention.
    pub fn clear_failures(&self) {
        self.fail_keys.lock().expect("lock").clear();
        self.contended_keys.lock().expect("lock").clear();
        self.unavailable.store(false, Ordering::SeqCst);
    }

    /// Simulates the store being unreachable (or reachable again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the underlying memory store.
    #[must_use]
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn record(&self, op: StoreOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, key: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::store("injected outage: store unavailable"));
        }
        let fail_keys = self.fail_keys.lock().expect("lock");
        if fail_keys.iter().any(|p| key.starts_with(p)) {
            return Err(Error::store(format!("injected failure for key: {key}")));
        }
        Ok(())
    }

    fn is_forced_contended(&self, key: &str) -> bool {
        self.contended_keys
            .lock()
            .expect("lock")
            .iter()
            .any(|p| key.starts_with(p))
    }

    async fn maybe_delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl LockStore for TracingMemoryStore {
    async fn try_set(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.maybe_delay().await;
        self.record(StoreOp::TrySet {
            key: key.to_string(),
            token: token.to_string(),
            ttl,
        });
        self.check_failure(key)?;
        if self.is_forced_contended(key) {
            return Ok(false);
        }
        self.inner.try_set(key, token, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool> {
        self.maybe_delay().await;
        self.record(StoreOp::CompareAndDelete {
            key: key.to_string(),
            token: token.to_string(),
        });
        self.check_failure(key)?;
        self.inner.compare_and_delete(key, token).await
    }

    async fn compare_and_expire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.maybe_delay().await;
        self.record(StoreOp::CompareAndExpire {
            key: key.to_string(),
            token: token.to_string(),
            ttl,
        });
        self.check_failure(key)?;
        self.inner.compare_and_expire(key, token, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.maybe_delay().await;
        self.record(StoreOp::Get {
            key: key.to_string(),
        });
        self.check_failure(key)?;
        self.inner.get(key).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.maybe_delay().await;
        self.record(StoreOp::Ttl {
            key: key.to_string(),
        });
        self.check_failure(key)?;
        self.inner.ttl(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.maybe_delay().await;
        self.record(StoreOp::Delete {
            key: key.to_string(),
        });
        self.check_failure(key)?;
        self.inner.delete(key).await
    }
}
