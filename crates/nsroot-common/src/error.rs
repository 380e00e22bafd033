//! Unified error types for the nsroot workspace.
//!
//! Variants follow the three failure classes of a launch: configuration
//! errors (caught before any namespace exists), setup errors (a kernel
//! primitive in the bootstrap sequence failed), and exec errors.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum NsrootError {
    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// An I/O operation on a specific file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A system call in the bootstrap sequence failed.
    #[error("{op} failed: {source}")]
    Syscall {
        /// The operation that failed, e.g. `pivot_root`.
        op: String,
        /// Underlying OS error, including the errno.
        source: std::io::Error,
    },

    /// A joined path does not fit in `PATH_MAX`.
    #[error("path too long ({len} bytes, limit {limit}): {path}", len = .path.as_os_str().len())]
    PathTooLong {
        /// The path that would have been produced.
        path: PathBuf,
        /// Maximum length in bytes, excluding the terminating NUL.
        limit: usize,
    },

    /// The parent/child synchronization protocol was violated.
    #[error("synchronization protocol violated: {message}")]
    Protocol {
        /// Description of the violation.
        message: String,
    },

    /// The target command could not be executed.
    #[error("execvp {program} failed: {source}")]
    Exec {
        /// Program that was being executed.
        program: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl NsrootError {
    /// Builds a [`NsrootError::Config`] from any displayable message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Builds a [`NsrootError::Syscall`] for the named operation.
    ///
    /// Accepts anything convertible into [`std::io::Error`], which covers
    /// `nix::errno::Errno` without this crate depending on `nix`.
    pub fn syscall(op: impl Into<String>, source: impl Into<std::io::Error>) -> Self {
        Self::Syscall {
            op: op.into(),
            source: source.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, NsrootError>;
