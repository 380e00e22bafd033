//! # nsroot-common
//!
//! Shared error definitions, id-map types, and constants used across the
//! nsroot workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and carries no Linux-specific code, so it can be used by
//! the CLI layer for validation before any kernel primitive is touched.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod constants;
pub mod error;
pub mod types;
