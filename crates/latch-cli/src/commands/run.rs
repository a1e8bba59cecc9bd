//! Run command - execute a child process while holding a lock.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use latch_core::{Guarded, LockStore, Locker};
use owo_colors::OwoColorize;
use serde_json::json;
use tokio::process::Command;

use super::PolicyArgs;
use crate::{Config, EXIT_CONTENDED, OutputFormat};

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Lock key.
    pub key: String,

    /// Lock TTL in milliseconds (default: `LATCH_LOCK_TTL_MS`).
    #[arg(long)]
    pub ttl_ms: Option<u64>,

    /// Retry behaviour under contention.
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Command and arguments to run.
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// Execute the run command.
///
/// Returns the child's exit code, 1 if it was killed by a signal, or
/// [`EXIT_CONTENDED`] if the lock stayed held elsewhere and the command was
/// not started.
///
/// # Errors
///
/// Returns an error if the command cannot be spawned or the store is
/// unreachable.
pub async fn execute<S>(args: RunArgs, locker: &Locker<S>, config: &Config) -> Result<i32>
where
    S: LockStore + ?Sized,
{
    let (program, program_args) = args
        .command
        .split_first()
        .context("A command to run is required after --")?;

    let ttl = args
        .ttl_ms
        .filter(|ms| *ms > 0)
        .map_or(locker.ttl(), Duration::from_millis);
    let locker = locker.clone().with_ttl(ttl);
    let policy = args.policy.policy(&config.latch);

    tracing::info!(key = %args.key, program = %program, "running command under lock");

    let outcome = locker
        .run_exclusive(&args.key, policy, move || async move {
            let status = Command::new(program)
                .args(program_args)
                .kill_on_drop(true)
                .status()
                .await
                .with_context(|| format!("Failed to spawn {program}"))?;
            Ok::<_, anyhow::Error>(status.code().unwrap_or(1))
        })
        .await?;

    match outcome {
        Guarded::Ran(code) => {
            if matches!(config.format, OutputFormat::Json) {
                let body = json!({ "key": args.key, "ran": true, "exit_code": code });
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
            Ok(code)
        }
        Guarded::Skipped { attempts } => {
            match config.format {
                OutputFormat::Json => {
                    let body = json!({ "key": args.key, "ran": false, "attempts": attempts });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                OutputFormat::Text => eprintln!(
                    "{} {} is held elsewhere, command not run",
                    "skipped:".yellow(),
                    args.key
                ),
            }
            Ok(EXIT_CONTENDED)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use latch_core::MemoryStore;

    use super::*;

    fn args(key: &str, script: &str) -> RunArgs {
        RunArgs {
            key: key.to_string(),
            ttl_ms: None,
            policy: PolicyArgs {
                fail_fast: true,
                ..PolicyArgs::default()
            },
            command: vec!["sh".into(), "-c".into(), script.into()],
        }
    }

    #[tokio::test]
    async fn propagates_child_exit_code_and_releases() -> Result<()> {
        let locker = Locker::new(Arc::new(MemoryStore::new()));

        let code = execute(args("job", "exit 3"), &locker, &Config::default()).await?;
        assert_eq!(code, 3);
        assert!(!locker.is_locked("job").await?);
        Ok(())
    }

    #[tokio::test]
    async fn skips_command_under_contention() -> Result<()> {
        let locker = Locker::new(Arc::new(MemoryStore::new()));
        let held = locker.try_acquire("job").await?.into_handle().expect("held");

        let code = execute(args("job", "exit 0"), &locker, &Config::default()).await?;
        assert_eq!(code, EXIT_CONTENDED);
        assert!(locker.release(held).await?);
        Ok(())
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error_and_releases() {
        let locker = Locker::new(Arc::new(MemoryStore::new()));
        let mut run = args("job", "");
        run.command = vec!["/nonexistent/latch-test-binary".into()];

        assert!(execute(run, &locker, &Config::default()).await.is_err());
        assert!(!locker.is_locked("job").await.expect("check"));
    }
}
