//! Control capability for a booted container.
//!
//! Handed to the body of a [`crate::boot::ContainerBoot`] session. Commands
//! run through `bash_exec` execute in the container's live filesystem
//! namespace, not through the image's entrypoint; inside a buildpack image
//! the launcher's env vars are not set and the working directory may differ.

use scabbard_common::cmd::CmdResult;

use crate::client::DockerClient;
use crate::error::{DockerError, Result};

/// Capability object for a running container.
#[derive(Debug)]
pub struct ContainerControl<'a> {
    client: &'a DockerClient,
    container_id: String,
    ports: Vec<u16>,
}

impl<'a> ContainerControl<'a> {
    pub(crate) fn new(client: &'a DockerClient, container_id: &str, ports: &[u16]) -> Self {
        Self {
            client,
            container_id: container_id.to_string(),
            ports: ports.to_vec(),
        }
    }

    /// Returns the container's ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.container_id
    }

    /// Returns the host port the daemon allocated for an exposed container
    /// port.
    ///
    /// # Errors
    ///
    /// Requesting a port that was not exposed at boot is a usage error
    /// naming the bound ports. Also fails if the daemon reports no binding.
    pub fn host_port(&self, port: u16) -> Result<u16> {
        if !self.ports.contains(&port) {
            return Err(DockerError::PortNotExposed {
                requested: port,
                bound: self.ports.clone(),
            });
        }

        let ports = self.client.container_ports(&self.container_id)?;
        let key = format!("{port}/tcp");
        ports
            .get(&key)
            .and_then(|bindings| bindings.as_ref())
            .and_then(|bindings| bindings.first())
            .and_then(|binding| binding.host_port.as_deref())
            .and_then(|host_port| host_port.parse().ok())
            .ok_or(DockerError::MissingHostPort { port })
    }

    /// Runs a command through `bash -c` inside the container, failing on a
    /// non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns a structured error carrying stdout/stderr when the command
    /// exits non-zero, or a daemon error if the exec request itself fails.
    pub fn bash_exec(&self, cmd: &str) -> Result<CmdResult> {
        let result = self.bash_exec_unchecked(cmd)?;
        if result.failed() {
            return Err(DockerError::ExecFailed {
                command: cmd.to_string(),
                output: result,
            });
        }
        Ok(result)
    }

    /// Runs a command through `bash -c` inside the container; the returned
    /// [`CmdResult`] carries any failure instead of an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if the exec request itself fails.
    pub fn bash_exec_unchecked(&self, cmd: &str) -> Result<CmdResult> {
        tracing::debug!(id = %self.container_id, %cmd, "exec in container");
        self.client.exec(
            &self.container_id,
            vec!["bash".into(), "-c".into(), cmd.into()],
        )
    }

    /// Returns whether a regular file exists inside the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the exec request fails.
    pub fn contains_file(&self, path: &str) -> Result<bool> {
        Ok(self
            .bash_exec_unchecked(&format!("[[ -f '{path}' ]]"))?
            .success())
    }

    /// Returns the contents of a file inside the container.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read (surfaced as the `cat` failure).
    pub fn file_contents(&self, path: &str) -> Result<String> {
        Ok(self.bash_exec(&format!("cat '{path}'"))?.stdout)
    }

    /// Returns the container's entrypoint logs so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be reached.
    pub fn logs(&self) -> Result<CmdResult> {
        let stdout = self.client.container_logs(&self.container_id, true, false)?;
        let stderr = self.client.container_logs(&self.container_id, false, true)?;
        Ok(CmdResult::new(stdout, stderr, 0))
    }
}
