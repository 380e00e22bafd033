//! Linux namespace selection for the bootstrap child.
//!
//! The child always gets a new user namespace and a new mount namespace;
//! network and IPC isolation are opt-in. Namespaces are created by
//! `clone(2)` in the launcher, so this module only computes the flags and
//! hands over the uid/gid maps.

pub mod user;

use nix::sched::CloneFlags;

/// Which optional namespaces to create alongside user and mount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate the network namespace.
    pub network: bool,
    /// Isolate the IPC namespace.
    pub ipc: bool,
}

impl NamespaceConfig {
    /// Returns the `clone(2)` flags for this selection.
    pub fn clone_flags(self) -> CloneFlags {
        let mut flags = CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNS;
        if self.network {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        if self.ipc {
            flags |= CloneFlags::CLONE_NEWIPC;
        }
        flags
    }

    /// Returns the short names of every namespace that will be created.
    pub fn names(self) -> Vec<&'static str> {
        let mut names = vec!["user", "mount"];
        if self.network {
            names.push("network");
        }
        if self.ipc {
            names.push("ipc");
        }
        names
    }
}
