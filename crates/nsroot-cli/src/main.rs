//! # nsroot
//!
//! Runs a command inside a new root, isolated in fresh user and mount
//! namespaces, with optional bind-mounted volumes from the host.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod cli;
mod output;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dry_run = cli.dry_run;
    let config = cli.into_config()?;

    if dry_run {
        tracing::debug!(mode = %config.mode(), "dry run, not launching");
        output::print_plan(&config.plan())?;
        return Ok(ExitCode::SUCCESS);
    }

    let code = nsroot_runtime::launcher::launch(&config)?;
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX)))
}
