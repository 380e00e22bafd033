//! One-shot parent → child synchronization over a pipe.
//!
//! The parent creates the channel before `clone(2)`, so both processes
//! start with both ends open. The child closes its copy of the write end
//! and blocks reading. The parent closes its read end, does its privileged
//! setup, and then closes the write end. The child's read returns
//! end-of-stream and it proceeds. Nothing is ever written through the
//! pipe; a byte arriving means the protocol was broken.

use std::fs::File;
use std::io::{ErrorKind, Read};

use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use nsroot_common::error::{NsrootError, Result};

/// Both ends of the sync pipe, as they exist right after creation.
#[derive(Debug)]
pub struct SyncChannel {
    read_end: File,
    write_end: Option<File>,
}

impl SyncChannel {
    /// Creates the pipe. Both ends are close-on-exec.
    ///
    /// # Errors
    ///
    /// Returns an error if `pipe2(2)` fails.
    pub fn new() -> Result<Self> {
        let (read_end, write_end) =
            pipe2(OFlag::O_CLOEXEC).map_err(|e| NsrootError::syscall("pipe2", e))?;
        tracing::debug!("sync channel created");
        Ok(Self {
            read_end: File::from(read_end),
            write_end: Some(File::from(write_end)),
        })
    }

    /// Child side: drops this process's write end and blocks until the
    /// parent releases the channel.
    ///
    /// # Errors
    ///
    /// Returns [`NsrootError::Protocol`] if data arrives instead of
    /// end-of-stream, or a syscall error if the read fails.
    pub fn wait(&mut self) -> Result<()> {
        drop(self.write_end.take());

        let mut byte = [0_u8; 1];
        loop {
            match (&self.read_end).read(&mut byte) {
                Ok(0) => return Ok(()),
                Ok(_) => {
                    return Err(NsrootError::Protocol {
                        message: format!("unexpected byte {:#04x} on sync pipe", byte[0]),
                    });
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(NsrootError::syscall("reading sync pipe", e)),
            }
        }
    }

    /// Parent side, after the child exists: drops the read end and keeps
    /// the write end as the release handle.
    pub fn into_release(self) -> SyncRelease {
        let Self {
            read_end,
            write_end,
        } = self;
        drop(read_end);
        SyncRelease { write_end }
    }
}

/// The parent's write end. Releasing it (or dropping it) unblocks the child.
#[derive(Debug)]
pub struct SyncRelease {
    write_end: Option<File>,
}

impl SyncRelease {
    /// Closes the write end, delivering end-of-stream to the child.
    pub fn release(mut self) {
        drop(self.write_end.take());
        tracing::debug!("sync channel released");
    }
}
