//! User namespace id-map handoff.
//!
//! The parent writes the child's `uid_map`/`gid_map` while the child is
//! parked on the sync channel. Until these files are written the child has
//! no usable identity in its namespace, so every mount it attempts would
//! be refused.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use nix::unistd::Pid;
use nsroot_common::constants::{GID_MAP_FILE, PROC_ROOT, SETGROUPS_FILE, UID_MAP_FILE};
use nsroot_common::error::{NsrootError, Result};
use nsroot_common::types::IdMap;

/// Writes the uid and gid maps of process `pid` under `/proc`.
///
/// A `None` map leaves the corresponding file untouched.
///
/// # Errors
///
/// Returns an error if writing to `/proc/<pid>/uid_map`,
/// `/proc/<pid>/setgroups`, or `/proc/<pid>/gid_map` fails.
pub fn write_id_maps(pid: Pid, uid_map: Option<&IdMap>, gid_map: Option<&IdMap>) -> Result<()> {
    write_id_maps_in(Path::new(PROC_ROOT), pid, uid_map, gid_map)
}

/// Same as [`write_id_maps`] against an arbitrary procfs root.
///
/// # Errors
///
/// Returns an error if any of the per-process files cannot be written.
pub fn write_id_maps_in(
    proc_root: &Path,
    pid: Pid,
    uid_map: Option<&IdMap>,
    gid_map: Option<&IdMap>,
) -> Result<()> {
    let proc_dir = proc_root.join(pid.as_raw().to_string());

    if let Some(map) = uid_map {
        write_map(&proc_dir.join(UID_MAP_FILE), map)?;
    }

    if let Some(map) = gid_map {
        // An unprivileged writer may only set gid_map once setgroups is denied.
        let setgroups = proc_dir.join(SETGROUPS_FILE);
        if setgroups.exists() {
            write_proc_file(&setgroups, b"deny")?;
        }
        write_map(&proc_dir.join(GID_MAP_FILE), map)?;
    }

    tracing::debug!(
        pid = pid.as_raw(),
        uid_map = uid_map.is_some(),
        gid_map = gid_map.is_some(),
        "wrote id maps"
    );
    Ok(())
}

fn write_map(path: &Path, map: &IdMap) -> Result<()> {
    write_proc_file(path, map.to_proc_format().as_bytes())
}

/// Maps must reach the kernel in a single `write(2)`. The file is never
/// created.
fn write_proc_file(path: &Path, contents: &[u8]) -> Result<()> {
    let io_err = |source| NsrootError::Io {
        path: PathBuf::from(path),
        source,
    };
    let mut file = OpenOptions::new().write(true).open(path).map_err(io_err)?;
    file.write_all(contents).map_err(io_err)
}
