//! Filesystem management for the bootstrap child.
//!
//! Provides the bind-mount engine used for volumes and the root switch
//! (`chroot` or `pivot_root`) that gives the child its new `/`.

pub mod mount;
pub mod switch_root;
