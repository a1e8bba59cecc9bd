//! Basic usage example demonstrating core latch concepts.
//!
//! Run with: `cargo run --example basic_usage`

use std::sync::Arc;
use std::time::Duration;

use latch_core::error::Result;
use latch_core::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    latch_core::init_logging(latch_core::LogFormat::Pretty);

    let locker = Locker::new(Arc::new(MemoryStore::new())).with_ttl(Duration::from_secs(10));

    // Acquire and release by hand
    let outcome = locker.acquire("reports/daily", RetryPolicy::default()).await?;
    if let AcquireOutcome::Acquired(handle) = outcome {
        println!("Acquired {} with token {}", handle.key(), handle.token());
        println!("Released: {}", locker.release(handle).await?);
    }

    // Guard an operation with a key derived from its arguments
    let key = KeyStrategy::from_args("transfer").resolve(&("alice", "bob", 250))?;
    let result = locker
        .run_exclusive(key.as_str(), RetryPolicy::fail_fast(), || async {
            Ok::<_, Error>("transferred")
        })
        .await?;
    println!("Guarded run: {result:?}");

    Ok(())
}
