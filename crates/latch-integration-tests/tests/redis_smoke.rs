//! Smoke tests against a live Redis server.
//!
//! # Running Tests
//!
//! ```bash
//! LATCH_TEST_REDIS_URL=redis://127.0.0.1:6379 \
//! cargo test --package latch-integration-tests --features redis-smoke -- --ignored
//! ```
//!
//! # What These Tests Verify
//!
//! - `SET NX PX` gives exactly one winner across connections
//! - Release by token is atomic and refuses stale tokens
//! - Entries expire server-side
//! - An unreachable server is a store error within the command timeout

#![cfg(feature = "redis-smoke")]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

use latch_core::{Error, Locker, RedisStore, RedisStoreConfig, RetryPolicy};
use latch_test_utils::{assert_acquired, contend};
use ulid::Ulid;

/// Helper to build a store config with a per-run namespace.
fn test_config() -> RedisStoreConfig {
    let url = env::var("LATCH_TEST_REDIS_URL").expect("LATCH_TEST_REDIS_URL required");
    RedisStoreConfig::new(url).with_key_prefix(format!("latch-test:{}:", Ulid::new()))
}

async fn locker() -> Locker<RedisStore> {
    let store = RedisStore::connect(&test_config()).await.expect("connect");
    Locker::new(Arc::new(store))
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_single_winner_across_connections() {
    let config = test_config();
    let a = Locker::new(Arc::new(RedisStore::connect(&config).await.unwrap()));
    let b = Locker::new(Arc::new(RedisStore::connect(&config).await.unwrap()));

    let held = assert_acquired(a.try_acquire("job").await);
    assert!(!b.try_acquire("job").await.unwrap().is_acquired());
    assert!(a.release(held).await.unwrap());
    let handle = assert_acquired(b.try_acquire("job").await);
    assert!(b.release(handle).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_concurrent_contention() {
    let locker = locker().await;
    let report = contend(&locker, "job", 20, RetryPolicy::fail_fast(), Duration::from_millis(100)).await;

    assert_eq!(report.acquired, 1);
    assert_eq!(report.contended, 19);
    assert_eq!(report.max_concurrent_holders, 1);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_stale_token_cannot_release() {
    let locker = locker().await.with_ttl(Duration::from_millis(200));

    let stale = assert_acquired(locker.try_acquire("job").await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!locker.is_locked("job").await.unwrap());

    let fresh = assert_acquired(locker.try_acquire("job").await);
    assert!(!locker.release(stale).await.unwrap());
    assert_eq!(locker.holder("job").await.unwrap().as_ref(), Some(fresh.token()));
    assert!(locker.release(fresh).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_extend_and_ttl() {
    let locker = locker().await.with_ttl(Duration::from_secs(1));

    let mut handle = assert_acquired(locker.try_acquire("job").await);
    assert!(locker.extend(&mut handle, Duration::from_secs(60)).await.unwrap());
    let ttl = locker.remaining_ttl("job").await.unwrap().expect("live");
    assert!(ttl > Duration::from_secs(30));
    assert!(locker.release(handle).await.unwrap());
    assert_eq!(locker.remaining_ttl("job").await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires an unroutable address"]
async fn test_unreachable_server_is_store_error() {
    let config = RedisStoreConfig::new("redis://10.255.255.1:6379")
        .with_command_timeout(Duration::from_millis(300));

    let started = Instant::now();
    let err = RedisStore::connect(&config).await.expect_err("unreachable");
    assert!(matches!(err, Error::Store { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
}
