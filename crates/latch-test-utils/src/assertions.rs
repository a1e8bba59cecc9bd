//! Custom assertion helpers for lock tests.

use latch_core::error::{Error, Result};
use latch_core::lock::{AcquireOutcome, LockHandle};

use crate::storage::StoreOp;

/// Asserts that an acquisition succeeded and returns its handle.
///
/// # Panics
///
/// Panics if the acquisition errored or was contended.
pub fn assert_acquired(result: Result<AcquireOutcome>) -> LockHandle {
    match result {
        Ok(AcquireOutcome::Acquired(handle)) => handle,
        Ok(AcquireOutcome::Contended { attempts }) => {
            panic!("Expected lock to be acquired, but it was contended after {attempts} attempts")
        }
        Err(e) => panic!("Expected lock to be acquired, but acquisition failed: {e}"),
    }
}

/// Asserts that an acquisition was contended after exactly `expected_attempts`.
///
/// # Panics
///
/// Panics if the lock was acquired, errored, or took a different number of
/// attempts.
pub fn assert_contended(result: Result<AcquireOutcome>, expected_attempts: u32) {
    match result {
        Ok(AcquireOutcome::Contended { attempts }) => assert_eq!(
            attempts, expected_attempts,
            "Expected {expected_attempts} attempts before giving up, got {attempts}"
        ),
        Ok(AcquireOutcome::Acquired(handle)) => panic!(
            "Expected contention, but lock was acquired with token {}",
            handle.token()
        ),
        Err(e) => panic!("Expected contention, but acquisition failed: {e}"),
    }
}

/// Asserts that an acquisition failed with a store error.
///
/// # Panics
///
/// Panics if the acquisition succeeded, was contended, or failed otherwise.
pub fn assert_store_error(result: Result<AcquireOutcome>) {
    match result {
        Err(Error::Store { .. }) => {}
        Err(e) => panic!("Expected a store error, got {e}"),
        Ok(outcome) => panic!(
            "Expected a store error, got an outcome after {} attempts",
            outcome.attempts()
        ),
    }
}

/// Asserts that every recorded `try_set` for `key` offered the same token.
///
/// # Panics
///
/// Panics if no `try_set` was recorded or tokens differ.
pub fn assert_single_token(ops: &[StoreOp], key: &str) {
    let tokens: Vec<&str> = ops
        .iter()
        .filter_map(|op| match op {
            StoreOp::TrySet { key: k, token, .. } if k == key => Some(token.as_str()),
            _ => None,
        })
        .collect();

    assert!(!tokens.is_empty(), "No try_set recorded for key {key}");
    assert!(
        tokens.windows(2).all(|w| w[0] == w[1]),
        "Expected one token across attempts for {key}, got {tokens:?}"
    );
}
