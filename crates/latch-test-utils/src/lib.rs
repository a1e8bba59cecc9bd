//! Shared test utilities for latch.
//!
//! This crate provides:
//! - [`TracingMemoryStore`]: In-memory lock store with operation recording
//!   and failure injection
//! - [`contend`]: Races many acquirers for one key
//! - Custom assertion helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use latch_test_utils::{TracingMemoryStore, assert_acquired};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let store = Arc::new(TracingMemoryStore::new());
//!     let locker = Locker::new(store.clone());
//!     let handle = assert_acquired(locker.try_acquire("k").await.unwrap());
//!     // ... run test ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod simulation;
pub mod storage;

pub use assertions::*;
pub use simulation::*;
pub use storage::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("latch_core=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
