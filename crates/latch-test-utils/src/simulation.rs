//! Contention harness for mutual-exclusion tests.
//!
//! [`contend`] spawns many tasks that race for the same key through a shared
//! [`Locker`]. Each winner holds the lock for a while and then releases it.
//! The harness tracks how many winners were inside the critical section at
//! the same time, which must never exceed one.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use latch_core::lock::{AcquireOutcome, Locker};
use latch_core::policy::RetryPolicy;
use latch_core::store::LockStore;
use tokio::task::JoinSet;

/// Aggregate result of a contention run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentionReport {
    /// Tasks that acquired the lock.
    pub acquired: usize,
    /// Tasks that exhausted their retry budget.
    pub contended: usize,
    /// Tasks whose acquisition returned an error.
    pub errors: usize,
    /// Highest number of tasks observed inside the critical section at once.
    pub max_concurrent_holders: usize,
    /// Releases that found the entry gone or held under another token.
    pub release_mismatches: usize,
    /// Releases that failed with a store error.
    pub release_errors: usize,
}

impl ContentionReport {
    /// Total tasks that finished.
    pub const fn total(&self) -> usize {
        self.acquired + self.contended + self.errors
    }
}

enum TaskResult {
    Acquired { release: latch_core::Result<bool> },
    Contended,
    Failed,
}

/// Races `contenders` tasks for `key`, each holding the lock for `hold`.
pub async fn contend<S>(
    locker: &Locker<S>,
    key: &str,
    contenders: usize,
    policy: RetryPolicy,
    hold: Duration,
) -> ContentionReport
where
    S: LockStore + ?Sized,
{
    let inside = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut tasks = JoinSet::new();

    for _ in 0..contenders {
        let locker = locker.clone();
        let key = key.to_string();
        let inside = Arc::clone(&inside);
        let peak = Arc::clone(&peak);

        tasks.spawn(async move {
            match locker.acquire(&key, policy).await {
                Ok(AcquireOutcome::Acquired(handle)) => {
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(hold).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                    let release = locker.release(handle).await;
                    TaskResult::Acquired { release }
                }
                Ok(AcquireOutcome::Contended { .. }) => TaskResult::Contended,
                Err(_) => TaskResult::Failed,
            }
        });
    }

    let mut report = ContentionReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined.expect("contender task panicked") {
            TaskResult::Acquired { release } => {
                report.acquired += 1;
                match release {
                    Ok(true) => {}
                    Ok(false) => report.release_mismatches += 1,
                    Err(_) => report.release_errors += 1,
                }
            }
            TaskResult::Contended => report.contended += 1,
            TaskResult::Failed => report.errors += 1,
        }
    }
    report.max_concurrent_holders = peak.load(Ordering::SeqCst);
    report
}

#[cfg(test)]
mod tests {
    use latch_core::store::MemoryStore;

    use super::*;
    use crate::storage::TracingMemoryStore;

    #[tokio::test]
    async fn fail_fast_contenders_have_one_winner() {
        let locker = Locker::new(Arc::new(MemoryStore::new()));

        let report = contend(
            &locker,
            "job",
            16,
            RetryPolicy::fail_fast(),
            Duration::from_millis(50),
        )
        .await;

        assert_eq!(report.total(), 16);
        assert_eq!(report.acquired, 1);
        assert_eq!(report.contended, 15);
        assert_eq!(report.max_concurrent_holders, 1);
    }

    #[tokio::test]
    async fn patient_contenders_take_turns() {
        let locker = Locker::new(Arc::new(MemoryStore::new()));

        let report = contend(
            &locker,
            "job",
            4,
            RetryPolicy::new(200, Duration::from_millis(5)),
            Duration::from_millis(10),
        )
        .await;

        assert_eq!(report.acquired, 4);
        assert_eq!(report.max_concurrent_holders, 1);
        assert_eq!(report.release_mismatches, 0);
        assert_eq!(report.release_errors, 0);
    }

    #[tokio::test]
    async fn release_store_errors_are_not_counted_as_mismatches() {
        let store = TracingMemoryStore::new();
        let locker = Locker::new(Arc::new(store.clone()));

        let outage = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            store.set_unavailable(true);
        };
        let run = contend(
            &locker,
            "job",
            4,
            RetryPolicy::fail_fast(),
            Duration::from_millis(100),
        );
        let (report, ()) = tokio::join!(run, outage);

        assert_eq!(report.acquired, 1);
        assert_eq!(report.contended, 3);
        assert_eq!(report.release_errors, 1);
        assert_eq!(report.release_mismatches, 0);
    }
}
