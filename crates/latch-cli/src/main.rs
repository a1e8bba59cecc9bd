//! Latch CLI - command-line client for distributed locks.
//!
//! The main entry point for the `latch` binary.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use latch_core::{LatchConfig, Locker, RedisStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use latch_cli::{Cli, Commands, exit_code_for};

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();
    let base = LatchConfig::from_env().context("Invalid LATCH_* environment")?;
    let config = cli.config(base);

    // Create runtime and execute
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let code = runtime.block_on(async {
        let store = RedisStore::connect(&config.latch.redis_store_config())
            .await
            .context("Failed to connect to Redis")?;
        let locker = Locker::new(Arc::new(store)).with_ttl(config.latch.lock_ttl);

        match cli.command {
            Commands::Acquire(args) => {
                latch_cli::commands::acquire::execute(args, &locker, &config).await
            }
            Commands::Release(args) => {
                latch_cli::commands::release::execute(args, &locker, &config).await
            }
            Commands::Status(args) => {
                latch_cli::commands::status::execute(args, &locker, &config).await
            }
            Commands::Run(args) => latch_cli::commands::run::execute(args, &locker, &config).await,
        }
    })?;

    drop(runtime);
    Ok(code)
}
