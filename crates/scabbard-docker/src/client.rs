//! Synchronous client for the Docker Engine API.

use std::future::Future;

use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{ListImagesOptions, RemoveImageOptions};
use bollard::models::PortMap;
use futures_util::StreamExt;
use scabbard_common::cmd::CmdResult;

use crate::error::{DockerError, Result};
use crate::image::ImageHandle;

/// Synchronous handle to the local Docker daemon.
///
/// Owns the async `bollard` client together with the tokio runtime that
/// drives it; every method blocks the caller until the daemon responds.
/// Connection is lazy: constructing the client succeeds without a running
/// daemon, and the first API call surfaces any connectivity error.
#[derive(Debug)]
pub struct DockerClient {
    docker: Docker,
    runtime: tokio::runtime::Runtime,
}

impl DockerClient {
    /// Connects using the platform's default daemon endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the client or its runtime cannot be constructed.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| DockerError::Runtime { source })?;
        Ok(Self { docker, runtime })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Lists the IDs of all images known to the daemon, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be reached.
    pub fn image_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.images()?.into_iter().map(|image| image.id).collect();
        ids.sort();
        Ok(ids)
    }

    /// Lists all images known to the daemon with their tags.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be reached.
    pub fn images(&self) -> Result<Vec<ImageHandle>> {
        let summaries = self.block_on(
            self.docker
                .list_images(None::<ListImagesOptions<String>>),
        )?;
        Ok(summaries
            .into_iter()
            .map(|summary| ImageHandle {
                id: summary.id,
                repo_tags: summary.repo_tags,
            })
            .collect())
    }

    /// Resolves an image by name or ID through daemon inspection.
    ///
    /// # Errors
    ///
    /// Returns an error if the image does not exist or the daemon cannot be
    /// reached.
    pub fn image_by_name(&self, name: &str) -> Result<ImageHandle> {
        let inspect = self.block_on(self.docker.inspect_image(name))?;
        let id = inspect
            .id
            .ok_or(DockerError::MissingField { field: "image id" })?;
        Ok(ImageHandle {
            id,
            repo_tags: inspect.repo_tags.unwrap_or_default(),
        })
    }

    /// Force-removes an image by name or ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon refuses the removal.
    pub fn remove_image(&self, image: &str) -> Result<()> {
        tracing::info!(%image, "removing image");
        let _ = self.block_on(self.docker.remove_image(
            image,
            Some(RemoveImageOptions {
                force: true,
                ..Default::default()
            }),
            None,
        ))?;
        Ok(())
    }

    /// Returns whether a container with this ID still exists.
    ///
    /// # Errors
    ///
    /// Returns an error for any daemon failure other than "not found".
    pub fn container_exists(&self, id: &str) -> Result<bool> {
        match self.block_on(self.docker.inspect_container(id, None::<InspectContainerOptions>)) {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    pub(crate) fn create_container(&self, config: Config<String>) -> Result<String> {
        let response = self.block_on(
            self.docker
                .create_container(None::<CreateContainerOptions<String>>, config),
        )?;
        Ok(response.id)
    }

    pub(crate) fn start_container(&self, id: &str) -> Result<()> {
        self.block_on(
            self.docker
                .start_container(id, None::<StartContainerOptions<String>>),
        )?;
        Ok(())
    }

    pub(crate) fn remove_container(&self, id: &str) -> Result<()> {
        self.block_on(self.docker.remove_container(
            id,
            Some(RemoveContainerOptions {
                force: true,
                ..Default::default()
            }),
        ))?;
        Ok(())
    }

    pub(crate) fn container_ports(&self, id: &str) -> Result<PortMap> {
        let inspect =
            self.block_on(self.docker.inspect_container(id, None::<InspectContainerOptions>))?;
        Ok(inspect
            .network_settings
            .and_then(|settings| settings.ports)
            .unwrap_or_default())
    }

    pub(crate) fn container_logs(&self, id: &str, stdout: bool, stderr: bool) -> Result<String> {
        let collected: Result<String> = self.block_on(async {
            let options = LogsOptions::<String> {
                stdout,
                stderr,
                ..Default::default()
            };
            let mut stream = self.docker.logs(id, Some(options));
            let mut collected = String::new();
            while let Some(chunk) = stream.next().await {
                match chunk? {
                    LogOutput::StdOut { message }
                    | LogOutput::StdErr { message }
                    | LogOutput::Console { message } => {
                        collected.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdIn { .. } => {}
                }
            }
            Ok(collected)
        });
        collected
    }

    /// Executes a command inside a running container, capturing output and
    /// the exit code.
    pub(crate) fn exec(&self, id: &str, cmd: Vec<String>) -> Result<CmdResult> {
        let result: Result<CmdResult> = self.block_on(async {
            let options = CreateExecOptions {
                cmd: Some(cmd),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                ..Default::default()
            };
            let exec = self.docker.create_exec(id, options).await?;

            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            match self.docker.start_exec(&exec.id, None).await? {
                StartExecResults::Attached { mut output, .. } => {
                    while let Some(chunk) = output.next().await {
                        match chunk? {
                            LogOutput::StdOut { message } => stdout.extend_from_slice(&message),
                            LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                            _ => {}
                        }
                    }
                }
                StartExecResults::Detached => {}
            }

            let inspect = self.docker.inspect_exec(&exec.id).await?;
            let status = inspect
                .exit_code
                .map_or(-1, |code| i32::try_from(code).unwrap_or(-1));

            Ok(CmdResult::new(
                String::from_utf8_lossy(&stdout),
                String::from_utf8_lossy(&stderr),
                status,
            ))
        });
        result
    }
}
