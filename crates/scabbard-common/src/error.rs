//! Unified error types for the Scabbard workspace.
//!
//! Each higher-level crate defines its own domain-specific error enum that
//! wraps these common variants when appropriate.

use std::path::PathBuf;

use thiserror::Error;

use crate::cmd::CmdResult;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum ScabbardError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The API was used out of order: a programmer mistake, not a runtime
    /// outcome.
    #[error("usage error: {message}")]
    Usage {
        /// Description of the misuse.
        message: String,
    },

    /// An external command exited with a non-zero status.
    #[error(
        "command `{command}` failed with status {}\nstdout: {}\nstderr: {}",
        .output.status,
        .output.stdout,
        .output.stderr
    )]
    CommandFailed {
        /// The full command line that was executed.
        command: String,
        /// The command's captured output and exit status.
        output: CmdResult,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ScabbardError>;
