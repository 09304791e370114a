//! Error types for build invocations.

use scabbard_common::error::ScabbardError;
use scabbard_docker::error::DockerError;
use thiserror::Error;

/// Errors raised while building images or packaging buildpacks.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Shared workspace error (I/O, usage, external-command failure).
    #[error(transparent)]
    Common(#[from] ScabbardError),

    /// Docker daemon interaction failed.
    #[error(transparent)]
    Docker(#[from] DockerError),
}

/// Convenience alias for build results.
pub type Result<T> = std::result::Result<T, BuildError>;
