//! Entry point of the bootstrap child.
//!
//! Runs on a copy of the launcher's address space right after `clone(2)`.
//! It must not return into the launcher's code: the only ways out are a
//! successful `exec` or a nonzero exit status handed back to `clone`.

use std::convert::Infallible;

use nsroot_common::constants::SETUP_FAILURE_EXIT_CODE;
use nsroot_common::error::{NsrootError, Result};
use nsroot_core::config::LaunchConfig;
use nsroot_core::filesystem::switch_root::ProcessRootState;
use nsroot_core::sync::SyncChannel;

use crate::exec::exec_command;

/// Waits for the parent, switches the root, and execs the command.
///
/// Returns the exit status of the child if any step fails.
pub fn run(config: &LaunchConfig, channel: &mut SyncChannel) -> isize {
    match bootstrap(config, channel) {
        Ok(never) => match never {},
        Err(err) => {
            report(&err);
            SETUP_FAILURE_EXIT_CODE as isize
        }
    }
}

fn bootstrap(config: &LaunchConfig, channel: &mut SyncChannel) -> Result<Infallible> {
    channel.wait()?;
    tracing::debug!(mode = %config.mode(), "released by parent, switching root");

    let root = ProcessRootState::Init.switch(config)?;
    exec_command(&root, config.command())
}

/// The diagnostic goes straight to stderr so it is visible whatever the
/// log filter says.
#[allow(clippy::print_stderr)]
fn report(err: &NsrootError) {
    tracing::error!(error = %err, "bootstrap failed");
    eprintln!("Error: {err}");
}
