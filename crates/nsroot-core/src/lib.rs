//! # nsroot-core
//!
//! Low-level Linux isolation primitives for nsroot.
//!
//! This crate provides safe abstractions over:
//! - **Configuration**: the validated, immutable [`config::LaunchConfig`].
//! - **Namespaces**: clone flags and uid/gid map handoff.
//! - **Filesystem**: bind mounts, read-only remounts, and the
//!   `chroot`/`pivot_root` root switch.
//! - **Synchronization**: the one-shot pipe gating the child until the
//!   parent has written its id maps.
//!
//! Kernel namespaces are never torn down here. They disappear when the
//! last process inside them exits, so the only cleanup any caller needs
//! is killing the child.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod filesystem;
pub mod namespace;
pub mod sync;
