//! Error types and result aliases for latch.
//!
//! Contention and release mismatches are ordinary outcomes and are reported
//! through return values, not through this type. [`Error`] is reserved for
//! conditions that mean something is wrong: an unreachable store, a malformed
//! key, bad configuration, or a cancelled wait.

/// The result type used throughout latch.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in latch operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backing store could not be reached, timed out, or returned a
    /// protocol-level failure.
    #[error("store error: {message}")]
    Store {
        /// Description of the store failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A lock key was empty or otherwise unusable.
    #[error("invalid lock key: {message}")]
    InvalidKey {
        /// Description of what made the key invalid.
        message: String,
    },

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// A serialization step (for example key derivation) failed.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// The caller cancelled an acquisition while it was waiting to retry.
    #[error("lock acquisition cancelled: {key}")]
    Cancelled {
        /// The key that was being acquired.
        key: String,
    },
}

impl Error {
    /// Creates a new store error with the given message.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new store error with a source cause.
    #[must_use]
    pub fn store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new invalid key error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns true if this error came from the backing store.
    #[must_use]
    pub const fn is_store(&self) -> bool {
        matches!(self, Self::Store { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = Error::store_with_source("connect", io);

        assert!(err.is_store());
        assert_eq!(err.to_string(), "store error: connect");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn non_store_errors_are_not_store() {
        assert!(!Error::invalid_key("empty").is_store());
        assert!(!Error::configuration("bad").is_store());
        assert!(
            !Error::Cancelled {
                key: "k".into()
            }
            .is_store()
        );
    }
}
