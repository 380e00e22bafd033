//! Root filesystem switching via `chroot(2)` or `pivot_root(2)`.
//!
//! `pivot_root` is the isolating mode: it replaces the root mount and then
//! detaches the previous root, so nothing of the host tree stays reachable
//! by path. `chroot` only changes the process's view of `/` and leaves the
//! host tree mounted.
//!
//! Every step is a one-shot kernel transition. A failure is returned
//! immediately and never retried.

use std::path::{Path, PathBuf};

use nix::mount::{MntFlags, MsFlags, mount, umount2};
use nix::unistd::{chdir, chroot, pivot_root};
use nsroot_common::error::{NsrootError, Result};

use crate::config::{LaunchConfig, RootSwitchMode, validate_old_root};
use crate::filesystem::mount::{bind_mount, join_prefixed, mount_all, remount_read_only};

/// Root and working directory of the calling process.
///
/// Owned by the bootstrap child and advanced only by [`ProcessRootState::switch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessRootState {
    /// Still on the host root.
    Init,
    /// `chroot` done, working directory is `/`.
    Chrooted {
        /// Host path of the new root.
        root: PathBuf,
    },
    /// `pivot_root` done, working directory is `/`, volumes mounted.
    Pivoted {
        /// Host path of the new root.
        root: PathBuf,
        /// Where the old root is still mounted, if it was kept.
        old_root: Option<PathBuf>,
    },
}

impl ProcessRootState {
    /// Whether the root has been switched and the process may exec.
    pub const fn is_switched(&self) -> bool {
        !matches!(self, Self::Init)
    }

    /// Switches the root according to `config.mode()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root was already switched or if any step of
    /// the sequence fails.
    pub fn switch(self, config: &LaunchConfig) -> Result<Self> {
        if self.is_switched() {
            return Err(NsrootError::Protocol {
                message: "root already switched".into(),
            });
        }
        match config.mode() {
            RootSwitchMode::Chroot => chroot_into(config.new_root()),
            RootSwitchMode::PivotRoot => pivot_into(config),
        }
    }
}

fn resolve_new_root(new_root: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(new_root).map_err(|source| NsrootError::Io {
        path: new_root.to_path_buf(),
        source,
    })
}

fn chroot_into(new_root: &Path) -> Result<ProcessRootState> {
    let root = resolve_new_root(new_root)?;

    chroot(root.as_path()).map_err(|e| NsrootError::syscall("chroot", e))?;
    chdir("/").map_err(|e| NsrootError::syscall("chdir(\"/\") after chroot", e))?;

    tracing::debug!(root = %root.display(), "chroot complete");
    Ok(ProcessRootState::Chrooted { root })
}

fn pivot_into(config: &LaunchConfig) -> Result<ProcessRootState> {
    let root = resolve_new_root(config.new_root())?;
    let old_root = config.old_root();
    validate_old_root(old_root)?;
    let old_root_abs = join_prefixed(Some(root.as_path()), old_root)?;

    // pivot_root refuses shared parent mounts; this also keeps the mounts
    // below from propagating back to the host.
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| NsrootError::syscall("make mount tree private", e))?;

    // The first argument of pivot_root must be a mount point.
    bind_mount(&root, &root)?;
    if config.read_only() {
        remount_read_only(&root)?;
    }

    pivot_root(root.as_path(), old_root_abs.as_path())
        .map_err(|e| NsrootError::syscall("pivot_root", e))?;
    chdir("/").map_err(|e| NsrootError::syscall("chdir(\"/\") after pivot_root", e))?;
    tracing::debug!(
        root = %root.display(),
        old_root = %old_root.display(),
        "pivot_root complete"
    );

    mount_all(config.volumes(), Some(old_root), None)?;

    if config.keep_old_root() {
        tracing::debug!(old_root = %old_root.display(), "keeping old root mounted");
        return Ok(ProcessRootState::Pivoted {
            root,
            old_root: Some(old_root.to_path_buf()),
        });
    }

    detach_old_root(old_root)?;
    Ok(ProcessRootState::Pivoted {
        root,
        old_root: None,
    })
}

/// Makes the old root private so the unmount cannot propagate to a shared
/// host mount, then lazily detaches it.
fn detach_old_root(old_root: &Path) -> Result<()> {
    mount(
        None::<&str>,
        old_root,
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| NsrootError::syscall("create private mount over old root", e))?;

    umount2(old_root, MntFlags::MNT_DETACH)
        .map_err(|e| NsrootError::syscall(format!("umount2({})", old_root.display()), e))?;

    tracing::debug!(old_root = %old_root.display(), "old root detached");
    Ok(())
}
