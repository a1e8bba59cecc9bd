//! # latch-core
//!
//! Distributed mutual exclusion arbitrated by a shared key-value store.
//!
//! Many processes may race for the same lock key; the store's atomic
//! set-if-absent decides the winner. Each acquisition writes a unique
//! ownership token with a TTL, and release deletes the entry only if it
//! still holds that token.
//!
//! - **Store**: [`LockStore`] with [`RedisStore`] for production and
//!   [`MemoryStore`] for tests
//! - **Acquisition**: [`Locker::acquire`] with a bounded fixed-delay
//!   [`RetryPolicy`]; contention is an [`AcquireOutcome`], not an error
//! - **Release**: [`Locker::release`], ownership-checked and atomic
//! - **Guarded execution**: [`Locker::run_exclusive`] runs an operation under
//!   the lock and always releases afterwards
//! - **Keys**: [`LockKey`] and [`KeyStrategy`] for explicit names or keys
//!   derived from call arguments
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use latch_core::prelude::*;
//!
//! # async fn demo() -> latch_core::Result<()> {
//! let locker = Locker::new(Arc::new(MemoryStore::new()));
//!
//! let key = LockKey::derive("invoice", &("acme", 2024))?;
//! let outcome = locker
//!     .run_exclusive(key.as_str(), RetryPolicy::fail_fast(), || async {
//!         Ok::<_, Error>("sent")
//!     })
//!     .await?;
//! assert!(outcome.ran());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod guarded;
pub mod key;
pub mod lock;
pub mod metrics;
pub mod observability;
pub mod policy;
pub mod store;
pub mod token;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use latch_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::LatchConfig;
    pub use crate::error::{Error, Result};
    pub use crate::guarded::Guarded;
    pub use crate::key::{KeyStrategy, LockKey};
    pub use crate::lock::{AcquireOutcome, LockHandle, Locker};
    pub use crate::policy::{FailurePolicy, RetryPolicy};
    pub use crate::store::{LockStore, MemoryStore, RedisStore, RedisStoreConfig};
    pub use crate::token::OwnershipToken;
}

// Re-export key types at crate root for ergonomics
pub use config::LatchConfig;
pub use error::{Error, Result};
pub use guarded::Guarded;
pub use key::{KeyStrategy, LockKey};
pub use lock::{AcquireOutcome, DEFAULT_LOCK_TTL, LockHandle, Locker};
pub use observability::{LogFormat, init_logging};
pub use policy::{FailurePolicy, RetryPolicy};
pub use store::{LockStore, MemoryStore, RedisStore, RedisStoreConfig};
pub use token::OwnershipToken;
