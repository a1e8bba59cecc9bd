//! Observability infrastructure for latch.
//!
//! Structured logging with consistent spans for lock operations.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops. Does nothing if another global subscriber
/// was already installed.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `latch_core=debug`)
///
/// # Example
///
/// ```rust
/// use latch_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init(),
        };
    });
}

/// Creates a span for a lock operation on `key`.
///
/// # Example
///
/// ```rust
/// use latch_core::observability::lock_span;
///
/// let span = lock_span("acquire", "orders/42");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn lock_span(operation: &str, key: &str) -> Span {
    tracing::info_span!("lock", op = operation, key = key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_succeeds() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json); // no-op after the first call
    }

    #[test]
    fn test_lock_span_creates_span() {
        let span = lock_span("release", "reports/daily");
        let _guard = span.enter();
        tracing::info!("message in lock span");
    }
}
