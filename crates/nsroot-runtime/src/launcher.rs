//! Namespace launcher: creates the bootstrap child and drives the handoff.
//!
//! Sequence, parent side:
//! 1. create the sync channel,
//! 2. `clone(2)` the child into new user and mount namespaces (plus the
//!    optional ones); the child parks on the channel,
//! 3. write the child's uid/gid maps,
//! 4. release the channel and wait for the child.
//!
//! If step 3 fails the child is killed and reaped before the error is
//! returned, so no half-configured process outlives the launcher.

use nix::sched::clone;
use nsroot_common::constants::CHILD_STACK_SIZE;
use nsroot_common::error::{NsrootError, Result};
use nsroot_core::config::LaunchConfig;
use nsroot_core::sync::SyncChannel;

use crate::child;
use crate::process::ChildHandle;

/// Launches `config.command()` inside the configured sandbox and returns
/// its exit code.
///
/// # Errors
///
/// Returns an error if the child cannot be created, if its id maps cannot
/// be written, or if waiting for it fails. Failures inside the child are
/// reported by the child itself and surface here as a nonzero exit code.
pub fn launch(config: &LaunchConfig) -> Result<i32> {
    let mut channel = SyncChannel::new()?;
    let mut stack = vec![0_u8; CHILD_STACK_SIZE];
    let flags = config.namespaces().clone_flags();

    tracing::info!(
        new_root = %config.new_root().display(),
        mode = %config.mode(),
        namespaces = ?config.namespaces().names(),
        "launching"
    );

    // SAFETY: without CLONE_VM the child runs on a private copy of this
    // address space, so `config` and `channel` are never shared between the
    // two processes. The launcher is single-threaded and the child only
    // returns an exit status or execs; it never unwinds into our frames.
    let pid = unsafe {
        clone(
            Box::new(|| child::run(config, &mut channel)),
            &mut stack,
            flags,
            Some(libc::SIGCHLD),
        )
    }
    .map_err(|e| NsrootError::syscall("clone", e))?;
    tracing::debug!(pid = pid.as_raw(), "child created");

    let mut child = ChildHandle::new(pid, channel.into_release());

    if let Err(err) = child.write_id_maps(config) {
        child.kill_and_reap();
        return Err(err);
    }
    tracing::debug!(pid = pid.as_raw(), "id maps written, releasing child");

    child.release();
    child.wait()
}
