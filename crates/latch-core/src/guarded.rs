//! Running an operation while holding a lock.
//!
//! [`Locker::run_exclusive`] is the explicit replacement for wrapping a method
//! with a lock: the caller passes the key, the retry policy and the operation.
//!
//! Guarantees:
//!
//! - If the lock cannot be obtained the operation is not started and the
//!   result is [`Guarded::Skipped`].
//! - Once the operation has started, release is attempted on every exit path:
//!   success, error, panic, and the whole future being dropped (the last one
//!   best-effort via a spawned release task).
//! - The operation's own error is returned unchanged after release; a panic is
//!   resumed after release.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::error::Error;
use crate::lock::{AcquireOutcome, LockHandle, Locker};
use crate::policy::RetryPolicy;
use crate::store::LockStore;
use crate::token::OwnershipToken;

/// Outcome of a guarded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Guarded<T> {
    /// The lock was obtained and the operation ran to completion.
    Ran(T),
    /// The lock was held elsewhere for the whole retry budget; the operation
    /// was not started.
    Skipped {
        /// Acquisition attempts made.
        attempts: u32,
    },
}

impl<T> Guarded<T> {
    /// Returns true if the operation ran.
    #[must_use]
    pub const fn ran(&self) -> bool {
        matches!(self, Self::Ran(_))
    }

    /// Returns true if the operation was skipped under contention.
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Returns the operation's value, or `None` if it was skipped.
    #[must_use]
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Ran(value) => Some(value),
            Self::Skipped { .. } => None,
        }
    }

    /// Maps the value of a completed operation.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Guarded<U> {
        match self {
            Self::Ran(value) => Guarded::Ran(f(value)),
            Self::Skipped { attempts } => Guarded::Skipped { attempts },
        }
    }
}

/// Releases a lock from `Drop` if the guarded future is abandoned mid-flight.
struct ReleaseOnDrop<S: LockStore + ?Sized> {
    armed: Option<(Arc<S>, String, OwnershipToken)>,
}

impl<S: LockStore + ?Sized> ReleaseOnDrop<S> {
    fn arm(store: Arc<S>, handle: &LockHandle) -> Self {
        Self {
            armed: Some((store, handle.key().to_string(), handle.token().clone())),
        }
    }

    fn disarm(&mut self) {
        self.armed = None;
    }
}

impl<S: LockStore + ?Sized> Drop for ReleaseOnDrop<S> {
    fn drop(&mut self) {
        let Some((store, key, token)) = self.armed.take() else {
            return;
        };

        // Without a runtime there is nothing to drive the release; the
        // entry's TTL cleans up instead.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(key = %key, "guarded operation dropped outside a runtime; lock left to expire");
            return;
        };

        runtime.spawn(async move {
            match store.compare_and_delete(&key, token.as_str()).await {
                Ok(released) => {
                    tracing::debug!(key = %key, released, "released lock of abandoned guarded operation");
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "failed to release lock of abandoned guarded operation");
                }
            }
        });
    }
}

impl<S: LockStore + ?Sized> Locker<S> {
    /// Runs `op` while holding `key`.
    ///
    /// Returns `Ok(Guarded::Skipped { .. })` without calling `op` if the lock
    /// stays held elsewhere for the whole `policy` budget. Otherwise runs
    /// `op`, releases the lock, and returns `op`'s result: its value as
    /// `Guarded::Ran`, or its error unchanged.
    ///
    /// A failed release (mismatch or store error) is logged and does not
    /// replace the operation's result, since the guarded work has already
    /// happened.
    ///
    /// # Errors
    ///
    /// Returns `op`'s error, or a lock error converted through `E: From<Error>`
    /// if acquisition hit a store failure or the key was invalid.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from `op` after the lock has been released.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use latch_core::guarded::Guarded;
    /// use latch_core::lock::Locker;
    /// use latch_core::policy::RetryPolicy;
    /// use latch_core::store::MemoryStore;
    ///
    /// # async fn demo() -> latch_core::Result<()> {
    /// let locker = Locker::new(Arc::new(MemoryStore::new()));
    ///
    /// let outcome = locker
    ///     .run_exclusive("reports/daily", RetryPolicy::fail_fast(), || async {
    ///         Ok::<_, latch_core::Error>(42)
    ///     })
    ///     .await?;
    /// assert_eq!(outcome, Guarded::Ran(42));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_exclusive<F, Fut, T, E>(
        &self,
        key: &str,
        policy: RetryPolicy,
        op: F,
    ) -> std::result::Result<Guarded<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<Error> + std::fmt::Display,
    {
        let handle = match self.acquire(key, policy).await? {
            AcquireOutcome::Acquired(handle) => handle,
            AcquireOutcome::Contended { attempts } => {
                tracing::debug!(key, attempts, "lock not obtained, guarded operation skipped");
                return Ok(Guarded::Skipped { attempts });
            }
        };

        let mut drop_guard = ReleaseOnDrop::arm(Arc::clone(self.store()), &handle);
        let outcome = AssertUnwindSafe(op()).catch_unwind().await;

        match self.release(handle).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(key, "guarded operation outlived its lock TTL");
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "could not release lock after guarded operation");
            }
        }
        drop_guard.disarm();

        match outcome {
            Ok(Ok(value)) => Ok(Guarded::Ran(value)),
            Ok(Err(e)) => {
                tracing::error!(key, error = %e, "guarded operation failed");
                Err(e)
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryStore;

    #[derive(Debug, thiserror::Error)]
    enum JobError {
        #[error("job failed: {0}")]
        Failed(&'static str),
        #[error(transparent)]
        Lock(#[from] Error),
    }

    fn locker() -> Locker<MemoryStore> {
        Locker::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn runs_and_releases() {
        let locker = locker();

        let outcome = locker
            .run_exclusive("job", RetryPolicy::fail_fast(), || async {
                Ok::<_, JobError>("done")
            })
            .await
            .expect("run");

        assert_eq!(outcome, Guarded::Ran("done"));
        assert!(!locker.is_locked("job").await.expect("check"));
    }

    #[tokio::test]
    async fn holds_lock_while_running() {
        let locker = locker();
        let inner = locker.clone();

        let outcome = locker
            .run_exclusive("job", RetryPolicy::fail_fast(), || async move {
                inner.is_locked("job").await.map_err(JobError::from)
            })
            .await
            .expect("run");

        assert_eq!(outcome, Guarded::Ran(true));
    }

    #[tokio::test]
    async fn skips_operation_under_contention() {
        let locker = locker();
        let _held = locker
            .try_acquire("job")
            .await
            .expect("acquire")
            .into_handle()
            .expect("held");

        let called = AtomicBool::new(false);
        let called_ref = &called;
        let outcome = locker
            .run_exclusive("job", RetryPolicy::new(2, Duration::from_millis(5)), move || async move {
                called_ref.store(true, Ordering::SeqCst);
                Ok::<_, JobError>(())
            })
            .await
            .expect("run");

        assert_eq!(outcome, Guarded::Skipped { attempts: 3 });
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn propagates_operation_error_after_release() {
        let locker = locker();

        let result = locker
            .run_exclusive("job", RetryPolicy::fail_fast(), || async {
                Err::<(), _>(JobError::Failed("disk full"))
            })
            .await;

        assert!(matches!(result, Err(JobError::Failed("disk full"))));
        assert!(!locker.is_locked("job").await.expect("check"));
    }

    #[tokio::test]
    async fn invalid_key_surfaces_as_lock_error() {
        let locker = locker();

        let result = locker
            .run_exclusive("", RetryPolicy::fail_fast(), || async { Ok::<_, JobError>(()) })
            .await;

        assert!(matches!(result, Err(JobError::Lock(Error::InvalidKey { .. }))));
    }

    #[tokio::test]
    async fn releases_then_resumes_panic() {
        let locker = locker();
        let task_locker = locker.clone();

        let joined = tokio::spawn(async move {
            task_locker
                .run_exclusive("job", RetryPolicy::fail_fast(), || async {
                    if true {
                        panic!("boom");
                    }
                    Ok::<_, JobError>(())
                })
                .await
        })
        .await;

        assert!(joined.expect_err("panicked").is_panic());
        assert!(!locker.is_locked("job").await.expect("check"));
    }

    #[tokio::test]
    async fn abandoned_operation_releases_in_background() {
        let locker = locker();
        let task_locker = locker.clone();
        let started = Arc::new(AtomicUsize::new(0));
        let started_in_task = Arc::clone(&started);

        let task = tokio::spawn(async move {
            task_locker
                .run_exclusive("job", RetryPolicy::fail_fast(), || async move {
                    started_in_task.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, JobError>(())
                })
                .await
        });

        while started.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(locker.is_locked("job").await.expect("check"));

        task.abort();
        let _ = task.await;

        // Give the spawned release a moment to run.
        for _ in 0..50 {
            if !locker.is_locked("job").await.expect("check") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("lock was not released after the guarded task was aborted");
    }

    #[test]
    fn guarded_helpers() {
        let ran: Guarded<u32> = Guarded::Ran(2);
        assert!(ran.ran());
        assert_eq!(ran.clone().map(|v| v * 2), Guarded::Ran(4));
        assert_eq!(ran.into_option(), Some(2));

        let skipped: Guarded<u32> = Guarded::Skipped { attempts: 1 };
        assert!(skipped.is_skipped());
        assert_eq!(skipped.into_option(), None);
    }
}
