//! Ownership tokens.
//!
//! Every acquisition writes a fresh token as the value of its lock entry.
//! Release and lease extension only succeed while the stored value still
//! equals the caller's token, which is how a holder proves it is still the
//! holder.
//!
//! Generated tokens are ULIDs: globally unique without coordination and
//! sortable by creation time, which makes store dumps easy to read. The store
//! treats them as opaque strings, so tokens minted elsewhere (for example
//! passed back in through the CLI) are accepted as-is.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};

/// Opaque proof of ownership for one lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnershipToken(String);

impl OwnershipToken {
    /// Generates a new unique token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Returns the token as it is stored.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the creation time encoded in a generated token.
    ///
    /// Returns `None` for tokens that are not ULIDs.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let ulid = Ulid::from_string(&self.0).ok()?;
        let ms = i64::try_from(ulid.timestamp_ms()).ok()?;
        DateTime::from_timestamp_millis(ms)
    }
}

impl fmt::Display for OwnershipToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OwnershipToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_key("ownership token cannot be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl AsRef<str> for OwnershipToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_unique() {
        let a = OwnershipToken::generate();
        let b = OwnershipToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 26);
    }

    #[test]
    fn generated_token_carries_creation_time() {
        let before = Utc::now() - chrono::Duration::seconds(1);
        let token = OwnershipToken::generate();
        let created = token.created_at().expect("ulid timestamp");
        assert!(created >= before);
    }

    #[test]
    fn foreign_tokens_parse_but_have_no_timestamp() {
        let token: OwnershipToken = "host-42:1700000000".parse().expect("parse");
        assert_eq!(token.as_str(), "host-42:1700000000");
        assert!(token.created_at().is_none());
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!("   ".parse::<OwnershipToken>().is_err());
    }
}
