//! Status command - show who holds a lock.

use anyhow::Result;
use clap::Args;
use latch_core::{LockStore, Locker};
use owo_colors::OwoColorize;
use serde_json::json;

use crate::{Config, OutputFormat};

/// Arguments for the status command.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Lock key.
    pub key: String,
}

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if the store is unreachable.
pub async fn execute<S>(args: StatusArgs, locker: &Locker<S>, config: &Config) -> Result<i32>
where
    S: LockStore + ?Sized,
{
    let holder = locker.holder(&args.key).await?;
    let ttl = match holder {
        Some(_) => locker.remaining_ttl(&args.key).await?,
        None => None,
    };

    match config.format {
        OutputFormat::Json => {
            let body = json!({
                "key": args.key,
                "locked": holder.is_some(),
                "token": holder.as_ref().map(latch_core::OwnershipToken::as_str),
                "acquired_at": holder
                    .as_ref()
                    .and_then(latch_core::OwnershipToken::created_at)
                    .map(|at| at.to_rfc3339()),
                "ttl_ms": ttl.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => match &holder {
            Some(token) => {
                println!("Key: {}", args.key);
                println!("State: {}", "locked".red());
                println!("Token: {token}");
                if let Some(at) = token.created_at() {
                    println!("Acquired: {at}");
                }
                if let Some(ttl) = ttl {
                    println!("Expires in: {}ms", ttl.as_millis());
                }
            }
            None => {
                println!("Key: {}", args.key);
                println!("State: {}", "free".green());
            }
        },
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use latch_core::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn status_reports_without_changing_state() -> Result<()> {
        let locker = Locker::new(Arc::new(MemoryStore::new()));
        let config = Config {
            format: OutputFormat::Json,
            ..Config::default()
        };

        let args = StatusArgs { key: "k".into() };
        assert_eq!(execute(args, &locker, &config).await?, 0);

        let handle = locker.try_acquire("k").await?.into_handle().expect("held");
        let args = StatusArgs { key: "k".into() };
        assert_eq!(execute(args, &locker, &config).await?, 0);
        assert!(locker.release(handle).await?);
        Ok(())
    }
}
