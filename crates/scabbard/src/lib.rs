//! # scabbard
//!
//! Test harness for Cloud Native Buildpacks. A fixture copies a source tree
//! into an isolated temporary directory, builds it with the external `pack`
//! CLI, boots the produced image as a container through the Docker Engine
//! API, and guarantees that every directory, image, container, and
//! background task it allocates is reclaimed, even when the test body
//! errors or teardown steps themselves fail.
//!
//! The daemon's image namespace is shared process-wide, so cleanup cannot be
//! enforced structurally; [`leak::LeakCheck`] snapshots the process
//! environment and the daemon's image set before a run and fails the suite
//! on any drift afterwards.
//!
//! ```no_run
//! use scabbard::{App, ScabbardConfig};
//!
//! # fn main() -> scabbard::Result<()> {
//! let config = ScabbardConfig {
//!     default_builder: Some("heroku/builder:24".to_string()),
//!     default_buildpacks: vec!["heroku/ruby".to_string()],
//!     ..ScabbardConfig::default()
//! };
//!
//! let mut app = App::new("test/fixtures/ruby-app", config);
//! app.transaction(|app| {
//!     let build = app.pack_build()?;
//!     assert!(build.stdout()?.contains("Successfully built image"));
//!
//!     let result = app.run("pwd")?;
//!     assert!(result.stdout.contains("/workspace"));
//!
//!     app.start_container(&[8080], |container| {
//!         let port = container.host_port(8080)?;
//!         println!("server listening on localhost:{port}");
//!         Ok(())
//!     })
//! })?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod app;
pub mod error;
pub mod leak;
pub mod query;
pub mod teardown;

pub use app::App;
pub use error::{Error, Result, TeardownFailures};
pub use scabbard_build::buildpack::{BuildpackRef, LocalBuildpack};
pub use scabbard_build::pack::{PackBuild, PackConfig};
pub use scabbard_common::cmd::CmdResult;
pub use scabbard_common::config::ScabbardConfig;
pub use scabbard_common::error::ScabbardError;
pub use scabbard_docker::client::DockerClient;
pub use scabbard_docker::control::ContainerControl;
pub use scabbard_docker::image::ImageHandle;
