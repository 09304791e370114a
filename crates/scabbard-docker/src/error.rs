//! Error types for the Docker facade.

use scabbard_common::cmd::CmdResult;
use scabbard_common::error::ScabbardError;
use thiserror::Error;

/// Errors raised by Docker-backed operations.
#[derive(Debug, Error)]
pub enum DockerError {
    /// The daemon returned an error or was unreachable.
    #[error("docker API error: {source}")]
    Api {
        /// Underlying client error.
        #[from]
        source: bollard::errors::Error,
    },

    /// The runtime driving the async client could not be built.
    #[error("failed to start docker client runtime: {source}")]
    Runtime {
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A host port was requested for a container port that was never exposed.
    #[error("port {requested} is not bound inside the container; bound ports: {bound:?}")]
    PortNotExposed {
        /// The container port the caller asked about.
        requested: u16,
        /// The ports that were actually exposed at boot.
        bound: Vec<u16>,
    },

    /// The daemon reported no host binding for an exposed container port.
    #[error("no host port allocated for container port {port}")]
    MissingHostPort {
        /// The container port lacking a binding.
        port: u16,
    },

    /// An inspection response was missing a required field.
    #[error("daemon response missing {field}")]
    MissingField {
        /// Name of the absent field.
        field: &'static str,
    },

    /// A command executed inside the container exited with a non-zero status.
    #[error(
        "bash_exec({command}) failed\nstdout: {}\nstderr: {}",
        .output.stdout,
        .output.stderr
    )]
    ExecFailed {
        /// The shell command that was executed.
        command: String,
        /// The command's captured output and exit status.
        output: CmdResult,
    },

    /// The container was created but could not be started.
    #[error("container failed to boot: {source}\nboot stdout: {stdout}\nboot stderr: {stderr}")]
    BootFailed {
        /// The start error reported by the daemon.
        source: Box<DockerError>,
        /// Container stdout captured up to the failure.
        stdout: String,
        /// Container stderr captured up to the failure.
        stderr: String,
    },

    /// Shared workspace error.
    #[error(transparent)]
    Common(#[from] ScabbardError),
}

/// Convenience alias for Docker-facade results.
pub type Result<T> = std::result::Result<T, DockerError>;
