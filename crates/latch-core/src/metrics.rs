//! Lock metrics.
//!
//! Counters and histograms for acquisition outcomes, store failures and
//! release mismatches. They go through the `metrics` facade; nothing is
//! exported unless the application installs a recorder.

use metrics::{counter, describe_counter, describe_histogram, histogram};

// ============================================================================
// Metric Names
// ============================================================================

/// Successful acquisitions.
pub const LOCK_ACQUIRED: &str = "latch_lock_acquired_total";

/// Acquisitions that exhausted their retry budget.
pub const LOCK_CONTENDED: &str = "latch_lock_contended_total";

/// Store failures, labelled by operation.
pub const LOCK_STORE_ERRORS: &str = "latch_lock_store_errors_total";

/// Releases that found the entry expired or owned by someone else.
pub const LOCK_RELEASE_MISMATCH: &str = "latch_lock_release_mismatch_total";

/// Attempts used per finished acquisition (won or lost).
pub const LOCK_ACQUIRE_ATTEMPTS: &str = "latch_lock_acquire_attempts";

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all lock metric descriptions.
///
/// Call this once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(LOCK_ACQUIRED, "Total successful lock acquisitions");
    describe_counter!(LOCK_CONTENDED, "Total acquisitions that gave up under contention");
    describe_counter!(LOCK_STORE_ERRORS, "Total lock store failures");
    describe_counter!(
        LOCK_RELEASE_MISMATCH,
        "Total releases where the lock had expired or changed hands"
    );
    describe_histogram!(LOCK_ACQUIRE_ATTEMPTS, "Attempts made per acquisition");
}

// ============================================================================
// Metric Recording
// ============================================================================

/// Records a successful acquisition.
pub fn record_acquired(attempts: u32) {
    counter!(LOCK_ACQUIRED).increment(1);
    histogram!(LOCK_ACQUIRE_ATTEMPTS, "outcome" => "acquired").record(f64::from(attempts));
}

/// Records an acquisition that gave up under contention.
pub fn record_contended(attempts: u32) {
    counter!(LOCK_CONTENDED).increment(1);
    histogram!(LOCK_ACQUIRE_ATTEMPTS, "outcome" => "contended").record(f64::from(attempts));
}

/// Records a store failure during `operation`.
pub fn record_store_error(operation: &'static str) {
    counter!(LOCK_STORE_ERRORS, "operation" => operation).increment(1);
}

/// Records a release that did not delete anything.
pub fn record_release_mismatch() {
    counter!(LOCK_RELEASE_MISMATCH).increment(1);
}
