//! Mount utilities for the child's private mount namespace.
//!
//! Resolves mount paths against a phase-dependent prefix and executes a
//! mount list in order, including the bind-then-remount sequence needed
//! for read-only bind mounts.

use std::ffi::OsString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use nix::mount::{MsFlags, mount};
use nix::sys::statvfs::{FsFlags, statvfs};
use nsroot_common::error::{NsrootError, Result};

use crate::config::MountSpec;

/// Longest path, in bytes, that can be handed to the kernel (the NUL
/// terminator takes the last byte of `PATH_MAX`).
#[allow(clippy::cast_sign_loss)]
pub const PATH_LIMIT: usize = libc::PATH_MAX as usize - 1;

/// Joins `path` under `prefix` with exactly one separator between them.
///
/// Trailing separators on `prefix` and leading separators on `path` are
/// collapsed, so `/new/` + `/mnt` and `/new` + `mnt` both give `/new/mnt`.
/// Without a prefix, `path` is returned as is.
///
/// # Errors
///
/// Returns [`NsrootError::PathTooLong`] if the result exceeds
/// [`PATH_LIMIT`]. The path is never truncated.
pub fn join_prefixed(prefix: Option<&Path>, path: &Path) -> Result<PathBuf> {
    let joined = match prefix {
        None => path.to_path_buf(),
        Some(prefix) => {
            let head = trim_trailing_separators(prefix.as_os_str().as_bytes());
            let tail = trim_leading_separators(path.as_os_str().as_bytes());
            let mut bytes = Vec::with_capacity(head.len() + tail.len() + 1);
            bytes.extend_from_slice(head);
            if head.is_empty() || !tail.is_empty() {
                bytes.push(b'/');
            }
            bytes.extend_from_slice(tail);
            PathBuf::from(OsString::from_vec(bytes))
        }
    };

    if joined.as_os_str().len() > PATH_LIMIT {
        return Err(NsrootError::PathTooLong {
            path: joined,
            limit: PATH_LIMIT,
        });
    }
    Ok(joined)
}

fn trim_trailing_separators(mut bytes: &[u8]) -> &[u8] {
    while let [rest @ .., b'/'] = bytes {
        bytes = rest;
    }
    bytes
}

fn trim_leading_separators(mut bytes: &[u8]) -> &[u8] {
    while let [b'/', rest @ ..] = bytes {
        bytes = rest;
    }
    bytes
}

/// Mounts every spec in order.
///
/// Bind sources are resolved under `source_prefix` and every target under
/// `target_prefix`. The first failure aborts the sequence; mounts that
/// already succeeded stay in place and vanish with the namespace.
///
/// # Errors
///
/// Returns an error if a path cannot be resolved or any mount fails.
pub fn mount_all(
    specs: &[MountSpec],
    source_prefix: Option<&Path>,
    target_prefix: Option<&Path>,
) -> Result<()> {
    for spec in specs {
        let source = if spec.is_bind() {
            join_prefixed(source_prefix, spec.source())?
        } else {
            spec.source().to_path_buf()
        };
        let target = join_prefixed(target_prefix, spec.target())?;
        mount_spec(spec, &source, &target)?;
    }
    Ok(())
}

/// Performs a single mount with already-resolved paths.
///
/// A bind mount cannot become read-only at creation, so read-only binds
/// are mounted first and then remounted read-only on the same target.
///
/// # Errors
///
/// Returns an error if the mount or the remount fails.
pub fn mount_spec(spec: &MountSpec, source: &Path, target: &Path) -> Result<()> {
    let flags = if spec.is_bind() {
        spec.flags() - MsFlags::MS_RDONLY
    } else {
        spec.flags()
    };

    mount(
        Some(source),
        target,
        spec.filesystem_type(),
        flags,
        spec.data(),
    )
    .map_err(|e| {
        NsrootError::syscall(
            format!("mount {} on {}", source.display(), target.display()),
            e,
        )
    })?;
    tracing::debug!(
        source = %source.display(),
        target = %target.display(),
        read_only = spec.is_read_only(),
        "mounted"
    );

    if spec.is_bind() && spec.is_read_only() {
        remount_read_only(target)?;
    }
    Ok(())
}

/// Creates a non-recursive bind mount of `source` onto `target`.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
pub fn bind_mount(source: &Path, target: &Path) -> Result<()> {
    mount_spec(&MountSpec::bind(source, target), source, target)
}

/// Remounts the bind mount at `target` read-only.
///
/// Inside a user namespace the per-mount flags inherited from the host
/// are locked and a remount that drops them fails with `EPERM`, so the
/// current flags are read back and carried over.
///
/// # Errors
///
/// Returns an error if `statvfs(2)` or the remount fails.
pub fn remount_read_only(target: &Path) -> Result<()> {
    let current = statvfs(target)
        .map_err(|e| NsrootError::syscall(format!("statvfs {}", target.display()), e))?
        .flags();

    mount(
        None::<&str>,
        target,
        None::<&str>,
        read_only_remount_flags(current),
        None::<&str>,
    )
    .map_err(|e| {
        NsrootError::syscall(format!("remount {} read-only", target.display()), e)
    })?;
    tracing::debug!(target = %target.display(), "remounted read-only");
    Ok(())
}

/// Builds `MS_BIND | MS_REMOUNT | MS_RDONLY` plus the locked flags present
/// in `current`.
pub fn read_only_remount_flags(current: FsFlags) -> MsFlags {
    const LOCKED: [(FsFlags, MsFlags); 6] = [
        (FsFlags::ST_NOSUID, MsFlags::MS_NOSUID),
        (FsFlags::ST_NODEV, MsFlags::MS_NODEV),
        (FsFlags::ST_NOEXEC, MsFlags::MS_NOEXEC),
        (FsFlags::ST_NOATIME, MsFlags::MS_NOATIME),
        (FsFlags::ST_NODIRATIME, MsFlags::MS_NODIRATIME),
        (FsFlags::ST_RELATIME, MsFlags::MS_RELATIME),
    ];

    LOCKED
        .iter()
        .filter(|(st, _)| current.contains(*st))
        .fold(
            MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
            |flags, (_, ms)| flags | *ms,
        )
}
