//! Hands the configured command the process image once the root is switched.

use std::convert::Infallible;
use std::ffi::CString;

use nix::unistd::execvp;
use nsroot_common::error::{NsrootError, Result};
use nsroot_core::filesystem::switch_root::ProcessRootState;

/// Replaces the current process with `command`, looked up through `PATH`.
///
/// Only returns on failure.
///
/// # Errors
///
/// Returns [`NsrootError::Protocol`] if the root has not been switched,
/// [`NsrootError::Config`] if `command` is empty, and
/// [`NsrootError::Exec`] if `execvp(3)` fails.
pub fn exec_command(root: &ProcessRootState, command: &[CString]) -> Result<Infallible> {
    if !root.is_switched() {
        return Err(NsrootError::Protocol {
            message: "exec attempted before the root switch".into(),
        });
    }
    let Some(program) = command.first() else {
        return Err(NsrootError::config("command must not be empty"));
    };

    tracing::debug!(program = %program.to_string_lossy(), "executing command");
    execvp(program, command).map_err(|e| NsrootError::Exec {
        program: program.to_string_lossy().into_owned(),
        source: e.into(),
    })
}
