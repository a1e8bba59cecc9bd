//! Release command - give up a lock by token.

use anyhow::{Context, Result};
use clap::Args;
use latch_core::{LockStore, Locker, OwnershipToken};
use owo_colors::OwoColorize;
use serde_json::json;

use crate::{Config, OutputFormat};

/// Arguments for the release command.
#[derive(Debug, Args)]
pub struct ReleaseArgs {
    /// Lock key.
    pub key: String,

    /// Ownership token printed by `latch acquire`.
    pub token: String,
}

/// Execute the release command.
///
/// Returns exit code 0 if the lock was deleted and 1 if it had expired or
/// belongs to another holder.
///
/// # Errors
///
/// Returns an error if the token is blank or the store is unreachable.
pub async fn execute<S>(args: ReleaseArgs, locker: &Locker<S>, config: &Config) -> Result<i32>
where
    S: LockStore + ?Sized,
{
    let token: OwnershipToken = args.token.parse().context("Invalid ownership token")?;
    let released = locker.release_token(&args.key, &token).await?;

    match config.format {
        OutputFormat::Json => {
            let body = json!({ "key": args.key, "released": released });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => {
            if released {
                println!("{} {}", "released".green(), args.key);
            } else {
                eprintln!(
                    "{} {} is not held under this token (expired or reclaimed)",
                    "not released:".yellow(),
                    args.key
                );
            }
        }
    }

    Ok(if released { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use latch_core::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn releases_only_with_matching_token() -> Result<()> {
        let locker = Locker::new(Arc::new(MemoryStore::new()));
        let handle = locker.try_acquire("deploy").await?.into_handle().expect("held");
        let token = handle.token().to_string();
        drop(handle);

        let wrong = ReleaseArgs {
            key: "deploy".into(),
            token: "01ARZ3NDEKTSV4RRFFQ69G5FAV".into(),
        };
        assert_eq!(execute(wrong, &locker, &Config::default()).await?, 1);
        assert!(locker.is_locked("deploy").await?);

        let right = ReleaseArgs {
            key: "deploy".into(),
            token,
        };
        assert_eq!(execute(right, &locker, &Config::default()).await?, 0);
        assert!(!locker.is_locked("deploy").await?);
        Ok(())
    }

    #[tokio::test]
    async fn blank_token_is_rejected() {
        let locker = Locker::new(Arc::new(MemoryStore::new()));
        let args = ReleaseArgs {
            key: "deploy".into(),
            token: " ".into(),
        };
        assert!(execute(args, &locker, &Config::default()).await.is_err());
    }
}
