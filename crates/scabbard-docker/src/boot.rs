//! Boots containers from built images and guarantees their removal.
//!
//! [`ContainerBoot::call`] creates a container, starts it, hands a
//! [`ContainerControl`] to the body, and force-deletes the container on every
//! exit path (normal return, body error, or start failure). Booting only
//! works for images whose entrypoint does not exit on its own.
//!
//! Each requested port is declared as exposed and given an empty host
//! binding, which tells the daemon to allocate a free host port; the chosen
//! port is retrievable through [`ContainerControl::host_port`] once the
//! container is running.

use std::collections::HashMap;

use bollard::container::Config;
use bollard::models::{HostConfig, PortBinding};

use crate::client::DockerClient;
use crate::control::ContainerControl;
use crate::error::DockerError;

/// One container boot session tied to a built image.
#[derive(Debug)]
pub struct ContainerBoot<'a> {
    client: &'a DockerClient,
    image_id: String,
    expose_ports: Vec<u16>,
}

impl<'a> ContainerBoot<'a> {
    /// Creates a session for `image_id` exposing the given container ports.
    #[must_use]
    pub fn new(client: &'a DockerClient, image_id: impl Into<String>, expose_ports: &[u16]) -> Self {
        Self {
            client,
            image_id: image_id.into(),
            expose_ports: expose_ports.to_vec(),
        }
    }

    /// Boots the container, runs `body` against it, and removes the
    /// container afterwards no matter how the body exits.
    ///
    /// # Errors
    ///
    /// Returns the body's error, a boot failure enriched with the
    /// container's startup logs, or a removal failure when everything else
    /// succeeded. If the container was never created there is nothing to
    /// remove and removal is skipped.
    pub fn call<T, E, F>(&self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&ContainerControl<'_>) -> std::result::Result<T, E>,
        E: From<DockerError>,
    {
        let config = container_config(&self.image_id, &self.expose_ports);
        let container_id = self.client.create_container(config).map_err(E::from)?;
        tracing::info!(id = %container_id, image = %self.image_id, "container created");

        let outcome = match self.client.start_container(&container_id) {
            Ok(()) => {
                let control =
                    ContainerControl::new(self.client, &container_id, &self.expose_ports);
                body(&control)
            }
            Err(source) => Err(E::from(self.boot_failure(&container_id, source))),
        };

        match self.client.remove_container(&container_id) {
            Ok(()) => tracing::info!(id = %container_id, "container removed"),
            Err(error) => {
                tracing::error!(id = %container_id, %error, "failed to remove container");
                if outcome.is_ok() {
                    return Err(E::from(error));
                }
            }
        }

        outcome
    }

    fn boot_failure(&self, container_id: &str, source: DockerError) -> DockerError {
        let stdout = self
            .client
            .container_logs(container_id, true, false)
            .unwrap_or_default();
        let stderr = self
            .client
            .container_logs(container_id, false, true)
            .unwrap_or_default();
        DockerError::BootFailed {
            source: Box::new(source),
            stdout,
            stderr,
        }
    }
}

/// Builds the container create request for an image and its exposed ports.
fn container_config(image_id: &str, ports: &[u16]) -> Config<String> {
    let mut exposed_ports = HashMap::new();
    let mut port_bindings = HashMap::new();
    for port in ports {
        let key = format!("{port}/tcp");
        let _ = exposed_ports.insert(key.clone(), HashMap::new());
        // An empty host port asks the daemon for a random unused one.
        let _ = port_bindings.insert(
            key,
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(String::new()),
            }]),
        );
    }

    Config {
        image: Some(image_id.to_string()),
        exposed_ports: Some(exposed_ports),
        host_config: Some(HostConfig {
            port_bindings: Some(port_bindings),
            ..Default::default()
        }),
        ..Default::default()
    }
}
