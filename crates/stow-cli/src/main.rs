#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod command;
mod config;

use std::process;

use anyhow::Context;
use stow_storage::Storage;

use crate::config::Cli;

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "stow_cli::startup";
pub const TRACING_TARGET_COMMAND: &str = "stow_cli::command";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_COMMAND,
            error = %format!("{error:#}"),
            "command failed"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Parses arguments, connects to storage and runs the subcommand.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    Cli::init_tracing();
    cli.log();

    let settings = cli
        .storage
        .resolve()
        .context("invalid storage configuration")?;
    let storage = Storage::new(settings).context("failed to initialize storage")?;

    cli.command.execute(&storage).await
}
