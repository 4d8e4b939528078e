#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use enroll_core::{LEASE_PATH, StorePath};
use enroll_lease::LeaseConfig;
use enroll_storage::SqliteStoreOptions;
use std::path::PathBuf;
use std::time::Duration;

/// Request and watch credential enrollment on the access-control device.
#[derive(Debug, Parser)]
#[command(name = "enroll", version, about)]
pub(crate) struct Cli {
    /// Directory holding the shared store database.
    #[arg(long, global = true, env = "ENROLL_STORAGE_DIR", default_value = ".enroll")]
    pub(crate) storage_dir: PathBuf,

    /// Seconds a pending registration may stay open.
    #[arg(long, global = true, env = "ENROLL_TTL_SECS", default_value_t = 120)]
    pub(crate) ttl_secs: u64,

    /// How often to check the store for changes, in milliseconds.
    #[arg(long, global = true, env = "ENROLL_POLL_MS", default_value_t = 250)]
    pub(crate) poll_ms: u64,

    /// Store key of the pending registration.
    #[arg(long, global = true, env = "ENROLL_LEASE_PATH", default_value = LEASE_PATH)]
    pub(crate) path: String,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Start a registration; fails if one is already in progress.
    Request {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Print the current slot status.
    Status,
    /// Cancel the registration in progress, if any.
    Release,
    /// Mark the registration in progress as completed (device side).
    Complete,
    /// Follow the slot status and countdown until interrupted.
    Watch,
}

impl Cli {
    pub(crate) fn lease_config(&self) -> Result<LeaseConfig, String> {
        let path = StorePath::try_new(self.path.clone()).map_err(|err| err.to_string())?;
        if self.ttl_secs == 0 {
            return Err("--ttl-secs must be positive".to_string());
        }
        Ok(LeaseConfig::default()
            .with_path(path)
            .with_ttl(Duration::from_secs(self.ttl_secs)))
    }

    pub(crate) fn store_options(&self) -> SqliteStoreOptions {
        SqliteStoreOptions {
            poll_interval: Duration::from_millis(self.poll_ms.max(10)),
            ..SqliteStoreOptions::default()
        }
    }
}
