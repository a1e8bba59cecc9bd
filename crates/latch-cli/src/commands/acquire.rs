//! Acquire command - take a lock and print its token.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use latch_core::{AcquireOutcome, LockStore, Locker};
use owo_colors::OwoColorize;
use serde_json::json;

use super::PolicyArgs;
use crate::{Config, OutputFormat};

/// Arguments for the acquire command.
#[derive(Debug, Args)]
pub struct AcquireArgs {
    /// Lock key.
    pub key: String,

    /// Lock TTL in milliseconds (default: `LATCH_LOCK_TTL_MS`).
    #[arg(long)]
    pub ttl_ms: Option<u64>,

    /// Retry behaviour under contention.
    #[command(flatten)]
    pub policy: PolicyArgs,
}

/// Execute the acquire command.
///
/// Prints the ownership token on success; pass it to `latch release` later.
/// Returns exit code 0 when acquired and 1 under contention.
///
/// # Errors
///
/// Returns an error if the key is invalid or the store is unreachable; the
/// binary maps a store error to [`EXIT_UNAVAILABLE`](crate::EXIT_UNAVAILABLE).
pub async fn execute<S>(args: AcquireArgs, locker: &Locker<S>, config: &Config) -> Result<i32>
where
    S: LockStore + ?Sized,
{
    let ttl = args
        .ttl_ms
        .filter(|ms| *ms > 0)
        .map_or(locker.ttl(), Duration::from_millis);
    let locker = locker.clone().with_ttl(ttl);
    let policy = args.policy.policy(&config.latch);

    match locker.acquire(&args.key, policy).await? {
        AcquireOutcome::Acquired(handle) => {
            match config.format {
                OutputFormat::Json => {
                    let body = json!({
                        "acquired": true,
                        "key": handle.key(),
                        "token": handle.token().as_str(),
                        "attempts": handle.attempts(),
                        "expires_at": handle.expires_at().to_rfc3339(),
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                OutputFormat::Text => println!("{}", handle.token()),
            }
            // The lock is handed to whoever holds the printed token.
            drop(handle);
            Ok(0)
        }
        AcquireOutcome::Contended { attempts } => {
            match config.format {
                OutputFormat::Json => {
                    let body = json!({
                        "acquired": false,
                        "key": args.key,
                        "attempts": attempts,
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                OutputFormat::Text => eprintln!(
                    "{} {} is held elsewhere (gave up after {attempts} attempts)",
                    "contended:".yellow(),
                    args.key
                ),
            }
            Ok(1)
        }
    }
}
