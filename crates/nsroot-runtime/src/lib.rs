//! Process management for nsroot.
//!
//! Creates the bootstrap child inside its new namespaces, drives the id-map
//! handoff and the sync channel from the parent side, runs the root switch
//! and `exec` on the child side, and reports the child's exit status.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod child;
pub mod exec;
pub mod launcher;
pub mod process;
