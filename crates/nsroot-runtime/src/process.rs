//! The parent's handle on the bootstrap child.
//!
//! A handle starts with the child parked on the sync channel. From there
//! the parent either writes the id maps, releases the channel, and waits,
//! or kills and reaps the child after a setup failure.

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;
use nsroot_common::constants::SIGNAL_EXIT_BASE;
use nsroot_common::error::{NsrootError, Result};
use nsroot_core::config::LaunchConfig;
use nsroot_core::namespace::user;
use nsroot_core::sync::SyncRelease;

/// A cloned child that has not been reaped yet.
#[derive(Debug)]
pub struct ChildHandle {
    pid: Pid,
    release: Option<SyncRelease>,
}

impl ChildHandle {
    /// Wraps a freshly cloned child and the parent's end of its sync channel.
    pub const fn new(pid: Pid, release: SyncRelease) -> Self {
        Self {
            pid,
            release: Some(release),
        }
    }

    /// Writes the configured uid and gid maps for the child.
    ///
    /// # Errors
    ///
    /// Returns an error if either map file cannot be written.
    pub fn write_id_maps(&self, config: &LaunchConfig) -> Result<()> {
        user::write_id_maps(self.pid, config.uid_map(), config.gid_map())
    }

    /// Lets the child proceed past the sync channel.
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release.release();
        }
    }

    /// Blocks until the child exits and returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if `waitpid(2)` fails.
    pub fn wait(mut self) -> Result<i32> {
        self.release();
        let status = self.reap()?;
        let code = exit_code(status);
        tracing::info!(pid = self.pid.as_raw(), code, "child exited");
        Ok(code)
    }

    /// Force-kills a child that is still parked and reaps it.
    ///
    /// The sync channel is never released, so the child cannot get past
    /// its blocking read before the signal lands.
    pub fn kill_and_reap(self) {
        tracing::warn!(pid = self.pid.as_raw(), "killing child after setup failure");
        if let Err(e) = kill(self.pid, Signal::SIGKILL) {
            tracing::warn!(pid = self.pid.as_raw(), error = %e, "kill failed");
        }
        if let Err(e) = self.reap() {
            tracing::warn!(pid = self.pid.as_raw(), error = %e, "reaping killed child failed");
        }
    }

    fn reap(&self) -> Result<WaitStatus> {
        loop {
            match waitpid(self.pid, None) {
                Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                    return Ok(status);
                }
                Ok(_) | Err(Errno::EINTR) => {}
                Err(e) => return Err(NsrootError::syscall("waitpid", e)),
            }
        }
    }
}

/// Maps a terminal wait status to a shell-style exit code.
///
/// A normal exit keeps its code; death by signal `n` becomes `128 + n`.
pub fn exit_code(status: WaitStatus) -> i32 {
    match status {
        WaitStatus::Exited(_, code) => code,
        WaitStatus::Signaled(_, signal, _) => SIGNAL_EXIT_BASE + signal as i32,
        _ => nsroot_common::constants::SETUP_FAILURE_EXIT_CODE,
    }
}
