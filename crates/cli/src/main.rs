#![forbid(unsafe_code)]

mod args;
mod commands;
mod render;

use args::{Cli, Command};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Command::Request { name, email } => commands::request(&cli, name, email).await,
        Command::Status => commands::status(&cli).await,
        Command::Release => commands::release(&cli).await,
        Command::Complete => commands::complete(&cli),
        Command::Watch => commands::watch(&cli).await,
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
