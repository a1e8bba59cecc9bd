//! Lock keys.
//!
//! A lock key names the resource being protected. Callers either name it
//! outright or derive it from the arguments of the operation being guarded.
//! Derivation is always an explicit call: the arguments are rendered as
//! canonical JSON (object keys sorted, no whitespace) and hashed, so the same
//! arguments always map to the same key regardless of map iteration order.
//!
//! # Example
//!
//! ```rust
//! use latch_core::key::{KeyStrategy, LockKey};
//!
//! let explicit = LockKey::new("orders/42").unwrap();
//! assert_eq!(explicit.as_str(), "orders/42");
//!
//! let derived = KeyStrategy::from_args("transfer").resolve(&("alice", "bob", 100)).unwrap();
//! assert!(derived.as_str().starts_with("transfer:"));
//! ```

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// The name of a lockable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    /// Creates a key from an explicit resource name.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKey` if the name is empty or only whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    /// Derives a key from serializable call arguments.
    ///
    /// The key is `{prefix}:{sha256(canonical_json(args))}`, or just the hex
    /// digest when `prefix` is empty.
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` if the arguments cannot be rendered as
    /// JSON (for example a map with non-string keys).
    pub fn derive<A: Serialize + ?Sized>(prefix: &str, args: &A) -> Result<Self> {
        let value = serde_json::to_value(args).map_err(|e| Error::Serialization {
            message: format!("derive lock key: {e}"),
        })?;
        // serde_json::Map is ordered, so rendering the Value sorts object keys.
        let canonical = serde_json::to_string(&value).map_err(|e| Error::Serialization {
            message: format!("derive lock key: {e}"),
        })?;
        let digest = hex::encode(Sha256::digest(canonical.as_bytes()));

        let prefix = prefix.trim();
        if prefix.is_empty() {
            Ok(Self(digest))
        } else {
            Ok(Self(format!("{prefix}:{digest}")))
        }
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key and returns the owned string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How a guarded operation's lock key is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Always use this name; call arguments are ignored.
    Explicit(String),
    /// Derive the key from the call arguments under a prefix.
    FromArgs {
        /// Namespace prepended to the argument digest.
        prefix: String,
    },
}

impl KeyStrategy {
    /// Strategy that always resolves to `name`.
    #[must_use]
    pub fn explicit(name: impl Into<String>) -> Self {
        Self::Explicit(name.into())
    }

    /// Strategy that derives keys from arguments under `prefix`.
    #[must_use]
    pub fn from_args(prefix: impl Into<String>) -> Self {
        Self::FromArgs {
            prefix: prefix.into(),
        }
    }

    /// Uses `name` when it is non-blank, otherwise falls back to argument
    /// derivation with no prefix.
    #[must_use]
    pub fn named_or_args(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some(name) if !name.is_empty() => Self::Explicit(name.to_string()),
            _ => Self::FromArgs {
                prefix: String::new(),
            },
        }
    }

    /// Resolves the strategy to a concrete key.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKey` for a blank explicit name, or
    /// `Error::Serialization` if the arguments cannot be rendered.
    pub fn resolve<A: Serialize + ?Sized>(&self, args: &A) -> Result<LockKey> {
        match self {
            Self::Explicit(name) => LockKey::new(name.clone()),
            Self::FromArgs { prefix } => LockKey::derive(prefix, args),
        }
    }
}

/// Rejects keys no store should be asked to hold.
pub(crate) fn validate(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(Error::invalid_key("lock key cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn explicit_key_round_trips() {
        let key = LockKey::new("inventory/sku-7").expect("valid");
        assert_eq!(key.as_str(), "inventory/sku-7");
        assert_eq!(key.to_string(), "inventory/sku-7");
    }

    #[test]
    fn blank_key_is_rejected() {
        assert!(matches!(LockKey::new(""), Err(Error::InvalidKey { .. })));
        assert!(matches!(LockKey::new("  \t"), Err(Error::InvalidKey { .. })));
    }

    #[test]
    fn derived_key_ignores_map_insertion_order() {
        let mut a = HashMap::new();
        a.insert("user", 1);
        a.insert("account", 2);
        let mut b = HashMap::new();
        b.insert("account", 2);
        b.insert("user", 1);

        let ka = LockKey::derive("pay", &a).expect("derive");
        let kb = LockKey::derive("pay", &b).expect("derive");
        assert_eq!(ka, kb);
    }

    #[test]
    fn derived_key_differs_for_different_args() {
        let a = LockKey::derive("pay", &("alice", 10)).expect("derive");
        let b = LockKey::derive("pay", &("alice", 11)).expect("derive");
        assert_ne!(a, b);
    }

    #[test]
    fn derived_key_without_prefix_is_bare_digest() {
        let key = LockKey::derive("  ", &[1, 2, 3]).expect("derive");
        assert_eq!(key.as_str().len(), 64);
        assert!(!key.as_str().contains(':'));
    }

    #[test]
    fn derive_rejects_non_string_map_keys() {
        let mut map = HashMap::new();
        map.insert((1, 2), "tuple keys");
        assert!(matches!(
            LockKey::derive("p", &map),
            Err(Error::Serialization { .. })
        ));
    }

    #[test]
    fn named_or_args_falls_back_on_blank_name() {
        assert_eq!(
            KeyStrategy::named_or_args(Some("reports")),
            KeyStrategy::Explicit("reports".into())
        );
        assert!(matches!(
            KeyStrategy::named_or_args(Some(" ")),
            KeyStrategy::FromArgs { .. }
        ));
        assert!(matches!(
            KeyStrategy::named_or_args(None),
            KeyStrategy::FromArgs { .. }
        ));
    }

    #[test]
    fn explicit_strategy_ignores_args() {
        let strategy = KeyStrategy::explicit("nightly-report");
        let a = strategy.resolve(&1).expect("resolve");
        let b = strategy.resolve(&"other").expect("resolve");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "nightly-report");
    }
}
