#![forbid(unsafe_code)]

use crate::args::Cli;
use crate::render::{countdown, error_line, status_line};
use enroll_core::{LeaseRecord, Registrant};
use enroll_lease::{LeaseError, LeaseManager, LeaseStatus};
use enroll_storage::{KvStore, SqliteStore};
use std::process::ExitCode;
use std::sync::Arc;

pub(crate) const EXIT_BUSY: u8 = 2;
pub(crate) const EXIT_UNKNOWN: u8 = 3;

type CmdResult = Result<ExitCode, Box<dyn std::error::Error>>;

fn open_store(cli: &Cli) -> Result<Arc<SqliteStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(SqliteStore::open_with(
        &cli.storage_dir,
        cli.store_options(),
    )?))
}

async fn start_manager(cli: &Cli) -> Result<LeaseManager, Box<dyn std::error::Error>> {
    let config = cli.lease_config()?;
    let store = open_store(cli)?;
    Ok(LeaseManager::start(store, config).await?)
}

fn lease_failure(err: &LeaseError) -> ExitCode {
    eprintln!("{}", error_line(err));
    match err {
        LeaseError::Busy { .. } => ExitCode::from(EXIT_BUSY),
        LeaseError::SubscriptionLost => ExitCode::from(EXIT_UNKNOWN),
        _ => ExitCode::FAILURE,
    }
}

pub(crate) async fn request(cli: &Cli, name: &str, email: &str) -> CmdResult {
    let registrant = match Registrant::try_new(name, email) {
        Ok(registrant) => registrant,
        Err(err) => {
            eprintln!("invalid registrant: {err}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let manager = start_manager(cli).await?;
    match manager.acquire(registrant).await {
        Ok(accepted) => {
            let ttl_secs = manager.config().ttl.as_secs();
            println!(
                "registration started for {} <{}>; complete it on the device within {}",
                accepted.record.registrant().name(),
                accepted.record.registrant().email(),
                countdown(ttl_secs)
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => Ok(lease_failure(&err)),
    }
}

pub(crate) async fn status(cli: &Cli) -> CmdResult {
    let manager = start_manager(cli).await?;
    let status = manager.status();
    println!("{}", status_line(&status));
    Ok(match status {
        LeaseStatus::Unknown => ExitCode::from(EXIT_UNKNOWN),
        _ => ExitCode::SUCCESS,
    })
}

pub(crate) async fn release(cli: &Cli) -> CmdResult {
    let manager = start_manager(cli).await?;
    match manager.release().await {
        Ok(()) => {
            println!("{}", status_line(&LeaseStatus::Free));
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => Ok(lease_failure(&err)),
    }
}

pub(crate) fn complete(cli: &Cli) -> CmdResult {
    let config = cli.lease_config()?;
    let store = open_store(cli)?;
    let Some(value) = store.read(&config.path)? else {
        println!("{}", status_line(&LeaseStatus::Free));
        return Ok(ExitCode::SUCCESS);
    };

    let record = LeaseRecord::from_value(&value)?;
    store.write(&config.path, &record.clone().completed().to_value())?;
    println!(
        "registration for {} marked completed",
        record.registrant().name()
    );
    Ok(ExitCode::SUCCESS)
}

pub(crate) async fn watch(cli: &Cli) -> CmdResult {
    let manager = start_manager(cli).await?;
    let mut updates = manager.watch();
    println!("{}", status_line(&updates.borrow_and_update()));

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(ExitCode::FAILURE);
                }
                let status = updates.borrow_and_update().clone();
                println!("{}", status_line(&status));
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("interrupted");
                return Ok(ExitCode::SUCCESS);
            }
        }
    }
}
