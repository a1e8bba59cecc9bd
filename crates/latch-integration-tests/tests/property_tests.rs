//! Property-based tests for lock invariants.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use latch_core::{FailurePolicy, LockKey, Locker, RetryPolicy};
use latch_test_utils::TracingMemoryStore;
use proptest::prelude::*;
use tokio_test::block_on;

/// Generates a lock key name.
fn arb_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_/.-]{0,30}"
}

/// Generates call arguments as a string map.
fn arb_args() -> impl Strategy<Value = HashMap<String, String>> {
    prop::collection::hash_map("[a-z]{1,8}", "[a-zA-Z0-9 ]{0,16}", 0..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A contended acquisition makes exactly `max_retries + 1` store attempts.
    #[test]
    fn contended_attempts_match_budget(key in arb_key(), retries in 0u32..12) {
        let store = TracingMemoryStore::new();
        let locker = Locker::new(Arc::new(store.clone()));

        let attempts = block_on(async {
            let _held = locker.try_acquire(&key).await.unwrap().into_handle().unwrap();
            store.clear_operations();
            locker
                .acquire(&key, RetryPolicy::new(retries, Duration::ZERO))
                .await
                .unwrap()
                .attempts()
        });

        prop_assert_eq!(attempts, retries + 1);
        prop_assert_eq!(store.try_set_count(&key), retries as usize + 1);
    }

    /// Fail-fast resolves to one attempt whatever the configured retry count.
    #[test]
    fn fail_fast_ignores_retry_count(retries in any::<u32>(), delay_ms in 0u64..10_000) {
        let policy = FailurePolicy::FailFast.resolve(retries, Duration::from_millis(delay_ms));
        prop_assert_eq!(policy.max_attempts(), 1);
        prop_assert!(policy.is_fail_fast());
    }

    /// Release succeeds exactly once per acquisition.
    #[test]
    fn release_succeeds_once(key in arb_key()) {
        let locker = Locker::new(Arc::new(TracingMemoryStore::new()));

        let (first, second) = block_on(async {
            let handle = locker.try_acquire(&key).await.unwrap().into_handle().unwrap();
            let token = handle.token().clone();
            let first = locker.release(handle).await.unwrap();
            let second = locker.release_token(&key, &token).await.unwrap();
            (first, second)
        });

        prop_assert!(first);
        prop_assert!(!second);
    }

    /// Derived keys depend only on argument content, not insertion order.
    #[test]
    fn derived_key_ignores_insertion_order(args in arb_args()) {
        let mut entries: Vec<_> = args.iter().collect();
        let forward: HashMap<_, _> = entries.iter().copied().collect();
        entries.reverse();
        let backward: HashMap<_, _> = entries.iter().copied().collect();

        prop_assert_eq!(
            LockKey::derive("job", &forward).unwrap(),
            LockKey::derive("job", &backward).unwrap()
        );
    }

    /// Distinct arguments derive distinct keys.
    #[test]
    fn distinct_args_derive_distinct_keys(a in "[a-z]{1,12}", b in "[a-z]{1,12}") {
        prop_assume!(a != b);
        prop_assert_ne!(
            LockKey::derive("job", &(&a,)).unwrap(),
            LockKey::derive("job", &(&b,)).unwrap()
        );
    }
}
