//! Distributed lock acquisition and release.
//!
//! A [`Locker`] turns the atomic primitives of a [`LockStore`] into a lock:
//!
//! - **Acquire**: write a fresh [`OwnershipToken`] with `try_set`; on contention
//!   sleep a fixed delay and retry with the same token until the
//!   [`RetryPolicy`] budget runs out
//! - **Release**: `compare_and_delete` with the handle's token, so a holder
//!   whose entry expired and was reclaimed cannot delete the new holder's entry
//! - **TTL**: every entry expires on its own, bounding the damage of a crashed
//!   holder
//!
//! Contention is an outcome ([`AcquireOutcome::Contended`]), not an error. A
//! store failure aborts the retry loop at once and is returned as
//! `Error::Store`.
//!
//! No in-process locking is involved: all arbitration happens in the store,
//! and the retry loop only suspends the calling task.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use latch_core::lock::{AcquireOutcome, Locker};
//! use latch_core::policy::RetryPolicy;
//! use latch_core::store::MemoryStore;
//!
//! # async fn demo() -> latch_core::Result<()> {
//! let locker = Locker::new(Arc::new(MemoryStore::new())).with_ttl(Duration::from_secs(10));
//!
//! if let AcquireOutcome::Acquired(handle) = locker.acquire("orders/42", RetryPolicy::default()).await? {
//!     // Critical section.
//!     locker.release(handle).await?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::key::validate as validate_key;
use crate::metrics;
use crate::observability::lock_span;
use crate::policy::RetryPolicy;
use crate::store::LockStore;
use crate::token::OwnershipToken;

/// Default lock TTL (30 seconds).
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// Proof of a successful acquisition.
///
/// Owned by the call stack that acquired it and consumed by
/// [`Locker::release`]. Deliberately not `Clone`: a handle stands for one
/// holder, and copies would let two code paths believe they both hold it.
#[derive(Debug)]
#[must_use = "a lock handle should be released once the critical section ends"]
pub struct LockHandle {
    key: String,
    token: OwnershipToken,
    acquired_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    attempts: u32,
}

impl LockHandle {
    /// Returns the lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the ownership token written for this acquisition.
    #[must_use]
    pub const fn token(&self) -> &OwnershipToken {
        &self.token
    }

    /// Returns when the lock was acquired.
    #[must_use]
    pub const fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Returns the locally estimated expiry.
    ///
    /// The store is authoritative; this is the acquisition (or last
    /// extension) time plus the TTL as seen by this process.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns how many attempts the acquisition took (1 = first try).
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns whether the locally estimated TTL has run out.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns the locally estimated remaining TTL, or zero if expired.
    #[must_use]
    pub fn remaining_ttl(&self) -> Duration {
        let millis = (self.expires_at - Utc::now()).num_milliseconds();
        if millis <= 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
        }
    }
}

/// Result of an acquisition that did not hit a store error.
#[derive(Debug)]
#[must_use]
pub enum AcquireOutcome {
    /// The lock is held; release the handle when done.
    Acquired(LockHandle),
    /// Another holder kept the lock for the whole retry budget.
    Contended {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

impl AcquireOutcome {
    /// Returns true if the lock was acquired.
    #[must_use]
    pub const fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }

    /// Returns the handle if the lock was acquired.
    #[must_use]
    pub fn into_handle(self) -> Option<LockHandle> {
        match self {
            Self::Acquired(handle) => Some(handle),
            Self::Contended { .. } => None,
        }
    }

    /// Returns how many attempts were made.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Acquired(handle) => handle.attempts,
            Self::Contended { attempts } => *attempts,
        }
    }
}

/// Acquires and releases locks against a shared store.
///
/// Cheap to clone; clones share the same store connection.
pub struct Locker<S: LockStore + ?Sized> {
    store: Arc<S>,
    ttl: Duration,
}

// Manual Clone implementation to avoid requiring S: Clone
impl<S: LockStore + ?Sized> Clone for Locker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ttl: self.ttl,
        }
    }
}

impl<S: LockStore + ?Sized> std::fmt::Debug for Locker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locker").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl<S: LockStore + ?Sized> Locker<S> {
    /// Creates a locker over `store` with the default TTL.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            ttl: DEFAULT_LOCK_TTL,
        }
    }

    /// Sets the TTL written with every new lock entry.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the TTL used for new lock entries.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Acquires `key`, retrying under contention as `policy` allows.
    ///
    /// Makes at most `policy.max_retries + 1` attempts, sleeping
    /// `policy.delay` between them. The first success returns immediately.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKey` for a blank key, or `Error::Store` as soon
    /// as any attempt fails to reach the store; the remaining budget is not
    /// spent.
    pub async fn acquire(&self, key: &str, policy: RetryPolicy) -> Result<AcquireOutcome> {
        self.acquire_inner(key, policy, None).await
    }

    /// Makes exactly one acquisition attempt.
    ///
    /// # Errors
    ///
    /// Same as [`acquire`](Self::acquire).
    pub async fn try_acquire(&self, key: &str) -> Result<AcquireOutcome> {
        self.acquire_inner(key, RetryPolicy::fail_fast(), None).await
    }

    /// Like [`acquire`](Self::acquire), but stops waiting when `cancel` fires.
    ///
    /// Cancellation is observed before each attempt and during the sleep
    /// between attempts, never while a store call is in flight, so a
    /// cancelled acquisition leaves no entry behind.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if `cancel` fires before the lock is won,
    /// plus everything [`acquire`](Self::acquire) can return.
    pub async fn acquire_cancellable(
        &self,
        key: &str,
        policy: RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<AcquireOutcome> {
        self.acquire_inner(key, policy, Some(cancel)).await
    }

    async fn acquire_inner(
        &self,
        key: &str,
        policy: RetryPolicy,
        cancel: Option<&CancellationToken>,
    ) -> Result<AcquireOutcome> {
        validate_key(key)?;

        // One token for every attempt of this acquisition.
        let token = OwnershipToken::generate();
        let mut remaining = policy.max_retries;
        let mut attempts: u32 = 0;

        async move {
            loop {
                if cancel.is_some_and(CancellationToken::is_cancelled) {
                    tracing::debug!(attempts, "lock acquisition cancelled");
                    return Err(Error::Cancelled {
                        key: key.to_string(),
                    });
                }

                attempts = attempts.saturating_add(1);
                let acquired_at = Utc::now();
                let created = match self.store.try_set(key, token.as_str(), self.ttl).await {
                    Ok(created) => created,
                    Err(e) => {
                        metrics::record_store_error("try_set");
                        tracing::warn!(attempts, error = %e, "lock store failed during acquisition");
                        self.clear_failed_attempt(key, &token).await;
                        return Err(e);
                    }
                };

                if created {
                    metrics::record_acquired(attempts);
                    tracing::debug!(attempts, token = %token, "lock acquired");
                    return Ok(AcquireOutcome::Acquired(LockHandle {
                        key: key.to_string(),
                        expires_at: expiry_after(acquired_at, self.ttl),
                        token,
                        acquired_at,
                        attempts,
                    }));
                }

                if remaining == 0 {
                    metrics::record_contended(attempts);
                    tracing::debug!(attempts, "lock held elsewhere, giving up");
                    return Ok(AcquireOutcome::Contended { attempts });
                }
                remaining -= 1;

                match cancel {
                    Some(cancel) => {
                        tokio::select! {
                            () = cancel.cancelled() => {
                                tracing::debug!(attempts, "lock acquisition cancelled while waiting");
                                return Err(Error::Cancelled { key: key.to_string() });
                            }
                            () = tokio::time::sleep(policy.delay) => {}
                        }
                    }
                    None => tokio::time::sleep(policy.delay).await,
                }
            }
        }
        .instrument(lock_span("acquire", key))
        .await
    }

    /// Releases a held lock.
    ///
    /// Returns true iff this call deleted the entry. False means the entry had
    /// already expired and possibly been taken by another holder; that is
    /// logged but is not an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store could not be reached.
    pub async fn release(&self, handle: LockHandle) -> Result<bool> {
        self.release_token(&handle.key, &handle.token).await
    }

    /// Releases `key` if it is still held under `token`.
    ///
    /// This is the raw form of [`release`](Self::release) for callers that
    /// carried the token across a process boundary.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store could not be reached.
    pub async fn release_token(&self, key: &str, token: &OwnershipToken) -> Result<bool> {
        async {
            let released = self
                .store
                .compare_and_delete(key, token.as_str())
                .await
                .inspect_err(|e| {
                    metrics::record_store_error("compare_and_delete");
                    tracing::warn!(error = %e, "lock store failed during release");
                })?;

            if released {
                tracing::debug!(token = %token, "lock released");
            } else {
                metrics::record_release_mismatch();
                tracing::warn!(
                    token = %token,
                    "lock release found no matching entry (expired or reclaimed)"
                );
            }
            Ok::<_, Error>(released)
        }
        .instrument(lock_span("release", key))
        .await
    }

    /// Extends a held lock to expire `ttl` from now.
    ///
    /// Returns false if the lock is no longer held under this handle's token.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store could not be reached.
    pub async fn extend(&self, handle: &mut LockHandle, ttl: Duration) -> Result<bool> {
        let span = lock_span("extend", &handle.key);
        async {
            let now = Utc::now();
            let extended = self
                .store
                .compare_and_expire(&handle.key, handle.token.as_str(), ttl)
                .await
                .inspect_err(|e| {
                    metrics::record_store_error("compare_and_expire");
                    tracing::warn!(error = %e, "lock store failed during extension");
                })?;

            if extended {
                handle.expires_at = expiry_after(now, ttl);
                tracing::debug!(ttl_ms = ttl.as_millis(), "lock extended");
            } else {
                tracing::warn!("lock extension refused: no longer the holder");
            }
            Ok::<_, Error>(extended)
        }
        .instrument(span)
        .await
    }

    /// Returns whether `key` currently has a live entry, whoever holds it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store could not be reached.
    pub async fn is_locked(&self, key: &str) -> Result<bool> {
        Ok(self.store.get(key).await?.is_some())
    }

    /// Returns the token currently holding `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store could not be reached.
    pub async fn holder(&self, key: &str) -> Result<Option<OwnershipToken>> {
        let current = self.store.get(key).await?;
        // Tokens are written by this crate and never blank.
        Ok(current.and_then(|raw| raw.parse().ok()))
    }

    /// Returns the store's remaining TTL for `key`, if it is held.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store could not be reached.
    pub async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.store.ttl(key).await
    }

    /// Forcefully deletes `key` regardless of holder (admin operation).
    ///
    /// # Warning
    ///
    /// Only for recovery when a holder is known to be dead but its TTL is
    /// long. The previous holder is not told and may still be running.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store could not be reached.
    pub async fn force_break(&self, key: &str) -> Result<()> {
        tracing::warn!(key, "force-breaking lock");
        self.store.delete(key).await
    }
}

impl<S: LockStore + ?Sized> Locker<S> {
    /// Deletes this acquisition's entry after a failed `try_set`.
    ///
    /// The write may have been applied before the error (a timeout after the
    /// server executed the command). The token is unique to this acquisition,
    /// so the delete can only remove our own orphan.
    async fn clear_failed_attempt(&self, key: &str, token: &OwnershipToken) {
        match self.store.compare_and_delete(key, token.as_str()).await {
            Ok(true) => tracing::warn!("removed entry left by a failed acquisition attempt"),
            Ok(false) => {}
            Err(e) => tracing::warn!(
                error = %e,
                "could not clean up after failed acquisition attempt; entry may persist until TTL"
            ),
        }
    }
}

fn expiry_after(start: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| start.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
