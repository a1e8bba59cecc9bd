//! # latch-cli
//!
//! Command-line client for latch distributed locks.
//!
//! ## Commands
//!
//! - `latch acquire` - Acquire a lock and print its ownership token
//! - `latch release` - Release a lock by token
//! - `latch status` - Show the current holder of a lock
//! - `latch run` - Run a command while holding a lock
//!
//! ## Configuration
//!
//! Defaults come from the `LATCH_*` environment variables read by
//! [`LatchConfig::from_env`]; flags override them:
//!
//! - `LATCH_REDIS_URL` - Redis endpoint (default: `redis://127.0.0.1:6379`)
//! - `LATCH_KEY_PREFIX` - Key namespace (default: `latch:`)
//! - `LATCH_COMMAND_TIMEOUT_MS` - Per-command store timeout
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success |
//! | 1 | `acquire` contended, or `release` found no matching entry |
//! | 2 | Invalid arguments |
//! | [`EXIT_UNAVAILABLE`] (69) | The lock store could not be reached or timed out |
//! | [`EXIT_SOFTWARE`] (70) | Any other failure |
//! | [`EXIT_CONTENDED`] (75) | `run` skipped its command because the lock was held |
//! | [`EXIT_CONFIG`] (78) | Malformed `LATCH_*` configuration |
//!
//! `run` otherwise exits with its child's code.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use std::time::Duration;

use clap::{Parser, Subcommand};
use latch_core::LatchConfig;

/// Exit code when the lock could not be obtained (`EX_TEMPFAIL`).
pub const EXIT_CONTENDED: i32 = 75;

/// Exit code when the lock store failed (`EX_UNAVAILABLE`).
pub const EXIT_UNAVAILABLE: i32 = 69;

/// Exit code for failures other than store errors (`EX_SOFTWARE`).
pub const EXIT_SOFTWARE: i32 = 70;

/// Exit code for malformed configuration (`EX_CONFIG`).
pub const EXIT_CONFIG: i32 = 78;

/// Maps a command failure to the process exit code.
///
/// The first [`latch_core::Error`] in the context chain decides the code, so
/// scripts can tell a store outage apart from contention.
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    let core = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<latch_core::Error>());
    match core {
        Some(e) if e.is_store() => EXIT_UNAVAILABLE,
        Some(latch_core::Error::Configuration { .. }) => EXIT_CONFIG,
        _ => EXIT_SOFTWARE,
    }
}

/// Latch CLI - distributed lock command-line interface.
#[derive(Debug, Parser)]
#[command(name = "latch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Redis connection URL.
    #[arg(long, env = "LATCH_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Namespace prepended to every lock key.
    #[arg(long, env = "LATCH_KEY_PREFIX")]
    pub key_prefix: Option<String>,

    /// Upper bound on a single store command, in milliseconds.
    #[arg(long, env = "LATCH_COMMAND_TIMEOUT_MS")]
    pub command_timeout_ms: Option<u64>,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration, applying flags over `base`.
    #[must_use]
    pub fn config(&self, base: LatchConfig) -> Config {
        let mut latch = base;
        if let Some(url) = &self.redis_url {
            latch.redis_url.clone_from(url);
        }
        if let Some(prefix) = &self.key_prefix {
            latch.key_prefix.clone_from(prefix);
        }
        if let Some(ms) = self.command_timeout_ms.filter(|ms| *ms > 0) {
            latch.command_timeout = Duration::from_millis(ms);
        }
        Config {
            latch,
            format: self.format.clone(),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Acquire a lock and print its ownership token.
    Acquire(commands::acquire::AcquireArgs),
    /// Release a lock held under a token.
    Release(commands::release::ReleaseArgs),
    /// Show the current holder of a lock.
    Status(commands::status::StatusArgs),
    /// Run a command while holding a lock.
    Run(commands::run::RunArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Lock defaults and store connection settings.
    pub latch: LatchConfig,
    /// Output format.
    pub format: OutputFormat,
}
