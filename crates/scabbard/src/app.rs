//! Top-level fixture for exercising a buildpack application.
//!
//! An [`App`] names a source tree and drives the whole lifecycle inside one
//! [`App::transaction`]: the source is copied into a fresh temporary
//! directory, the process working directory moves there for the duration of
//! the body, and registered teardown actions run unconditionally before the
//! directory is removed, whether the body returned, errored, or panicked.
//!
//! ```no_run
//! use scabbard::{App, ScabbardConfig};
//!
//! # fn main() -> scabbard::Result<()> {
//! let config = ScabbardConfig {
//!     default_builder: Some("heroku/builder:24".to_string()),
//!     ..ScabbardConfig::default()
//! };
//! let mut app = App::new("test/fixtures/ruby-app", config);
//! app.transaction(|app| {
//!     let build = app.pack_build()?;
//!     assert!(build.success()?);
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

use std::any::Any;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use scabbard_build::buildpack::BuildpackRef;
use scabbard_build::pack::{self, PackBuild, PackConfig};
use scabbard_common::cmd::{self, CmdResult};
use scabbard_common::config::ScabbardConfig;
use scabbard_common::error::ScabbardError;
use scabbard_common::paths;
use scabbard_docker::boot::ContainerBoot;
use scabbard_docker::client::DockerClient;
use scabbard_docker::control::ContainerControl;

use crate::error::{Error, Result};
use crate::teardown::TeardownQueue;

/// One test fixture's isolated execution context.
#[derive(Debug)]
pub struct App {
    source: String,
    config: ScabbardConfig,
    env: BTreeMap<String, String>,
    builder: Option<String>,
    buildpacks: Vec<BuildpackRef>,
    image_name: String,
    docker: OnceLock<Arc<DockerClient>>,
    app_dir: Option<PathBuf>,
    builds: Vec<PackBuild>,
    teardown: TeardownQueue,
}

impl App {
    /// Creates a fixture for `source`: an existing directory path, or a
    /// name resolved by basename against the config's repo directories when
    /// the transaction starts.
    ///
    /// The builder and buildpacks default from the config; the image name is
    /// freshly generated.
    #[must_use]
    pub fn new(source: impl Into<String>, config: ScabbardConfig) -> Self {
        let builder = config.default_builder.clone();
        let buildpacks = config
            .default_buildpacks
            .iter()
            .cloned()
            .map(BuildpackRef::Literal)
            .collect();
        Self {
            source: source.into(),
            config,
            env: BTreeMap::new(),
            builder,
            buildpacks,
            image_name: pack::generated_image_name(),
            docker: OnceLock::new(),
            app_dir: None,
            builds: Vec::new(),
            teardown: TeardownQueue::default(),
        }
    }

    /// Overrides the builder passed to `pack build -B`.
    #[must_use]
    pub fn with_builder(mut self, builder: impl Into<String>) -> Self {
        self.builder = Some(builder.into());
        self
    }

    /// Replaces the buildpack references for this fixture.
    #[must_use]
    pub fn with_buildpacks(mut self, buildpacks: Vec<BuildpackRef>) -> Self {
        self.buildpacks = buildpacks;
        self
    }

    /// Adds one build-time environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.env.insert(key.into(), value.into());
        self
    }

    /// Overrides the generated image name.
    #[must_use]
    pub fn with_image_name(mut self, image_name: impl Into<String>) -> Self {
        self.image_name = image_name.into();
        self
    }

    /// Injects a shared Docker client instead of connecting lazily.
    #[must_use]
    pub fn with_docker(self, docker: Arc<DockerClient>) -> Self {
        let _ = self.docker.set(docker);
        self
    }

    /// The fixture's Docker client, connected on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be constructed.
    pub fn docker(&self) -> Result<&Arc<DockerClient>> {
        if self.docker.get().is_none() {
            let client = Arc::new(DockerClient::connect().map_err(Error::from)?);
            let _ = self.docker.set(client);
        }
        self.docker
            .get()
            .ok_or_else(|| usage("docker client unavailable"))
    }

    /// The configuration this fixture was built with.
    #[must_use]
    pub fn config(&self) -> &ScabbardConfig {
        &self.config
    }

    /// Name the built image is tagged with.
    #[must_use]
    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    /// The isolated working directory of the running transaction.
    ///
    /// # Errors
    ///
    /// Usage error outside a transaction.
    pub fn app_dir(&self) -> Result<&Path> {
        self.app_dir
            .as_deref()
            .ok_or_else(|| usage("app_dir is only available inside a transaction"))
    }

    /// Every build this fixture has recorded, in execution order.
    #[must_use]
    pub fn builds(&self) -> &[PackBuild] {
        &self.builds
    }

    /// The most recent build record.
    ///
    /// # Errors
    ///
    /// Usage error when no build has run yet, distinct from a failed build.
    pub fn last_build(&self) -> Result<&PackBuild> {
        self.builds
            .last()
            .ok_or_else(|| usage("no build has run; call pack_build first"))
    }

    /// Stdout of the most recent build.
    ///
    /// # Errors
    ///
    /// Usage error when no build has run yet.
    pub fn stdout(&self) -> Result<&str> {
        self.last_build()?.stdout().map_err(Error::from)
    }

    /// Stderr of the most recent build.
    ///
    /// # Errors
    ///
    /// Usage error when no build has run yet.
    pub fn stderr(&self) -> Result<&str> {
        self.last_build()?.stderr().map_err(Error::from)
    }

    /// Whether the most recent build succeeded.
    ///
    /// # Errors
    ///
    /// Usage error when no build has run yet.
    pub fn success(&self) -> Result<bool> {
        self.last_build()?.success().map_err(Error::from)
    }

    /// Whether the most recent build failed.
    ///
    /// # Errors
    ///
    /// Usage error when no build has run yet.
    pub fn failed(&self) -> Result<bool> {
        self.last_build()?.failed().map_err(Error::from)
    }

    /// Registers a cleanup action to run when the transaction ends.
    ///
    /// Actions run in reverse-registration order; every action runs even
    /// when earlier ones fail.
    pub fn on_teardown(&mut self, action: impl FnOnce() -> Result<()> + Send + 'static) {
        self.teardown.push(action);
    }

    /// Runs `body` inside an isolated copy of the fixture source.
    ///
    /// The source is resolved and copied into a fresh temporary directory,
    /// which becomes the process working directory for the duration of the
    /// body. Afterwards, on normal return, body error, or body panic, all
    /// registered teardown actions run, the previous working directory is
    /// restored, and the temporary directory is removed. A panic is resumed
    /// once cleanup finished.
    ///
    /// # Errors
    ///
    /// The body's error takes precedence; otherwise the collected teardown
    /// failures; otherwise any failure restoring the working directory.
    pub fn transaction<T, F>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let source =
            paths::resolve_path(&self.source, &self.config.repo_dirs).map_err(Error::from)?;
        let tmp = tempfile::tempdir().map_err(|source| {
            Error::Common(ScabbardError::Io {
                path: std::env::temp_dir(),
                source,
            })
        })?;
        paths::copy_dir_all(&source, tmp.path()).map_err(Error::from)?;

        let previous_dir = std::env::current_dir().map_err(|source| {
            Error::Common(ScabbardError::Io {
                path: PathBuf::from("."),
                source,
            })
        })?;
        std::env::set_current_dir(tmp.path()).map_err(|source| {
            Error::Common(ScabbardError::Io {
                path: tmp.path().to_path_buf(),
                source,
            })
        })?;
        self.app_dir = Some(tmp.path().to_path_buf());
        tracing::info!(source = %source.display(), dir = %tmp.path().display(), "transaction started");

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| body(&mut *self)));

        let teardown_outcome = self.teardown.run();
        self.app_dir = None;

        let restored = std::env::set_current_dir(&previous_dir).map_err(|source| {
            Error::Common(ScabbardError::Io {
                path: previous_dir.clone(),
                source,
            })
        });
        if let Err(error) = tmp.close() {
            tracing::warn!(%error, "failed to remove transaction directory");
        }

        match outcome {
            Ok(result) => {
                let value = result?;
                teardown_outcome?;
                restored?;
                Ok(value)
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Builds the fixture with `pack`, failing on a build failure.
    ///
    /// The build is recorded and removal of its image is registered on the
    /// teardown queue whether or not the build succeeded.
    ///
    /// # Errors
    ///
    /// Usage error outside a transaction; otherwise see [`PackBuild::call`].
    pub fn pack_build(&mut self) -> Result<&PackBuild> {
        self.execute_build(true)
    }

    /// Builds the fixture with `pack`; a build failure is carried by the
    /// recorded result instead of an error.
    ///
    /// # Errors
    ///
    /// Usage error outside a transaction; otherwise see
    /// [`PackBuild::try_call`].
    pub fn try_pack_build(&mut self) -> Result<&PackBuild> {
        self.execute_build(false)
    }

    fn execute_build(&mut self, checked: bool) -> Result<&PackBuild> {
        let app_dir = self
            .app_dir
            .clone()
            .ok_or_else(|| usage("pack_build is only available inside a transaction"))?;

        let mut build = PackBuild::new(PackConfig {
            app_dir,
            image_name: self.image_name.clone(),
            builder: self.builder.clone(),
            buildpacks: self.buildpacks.clone(),
            env: self.env.clone(),
        })
        .map_err(Error::from)?;

        let docker = Arc::clone(self.docker()?);
        let outcome = if checked {
            build.call(&docker).map(drop)
        } else {
            build.try_call(&docker).map(drop)
        };

        let image = build.image_handle().cloned();
        let removal_client = Arc::clone(&docker);
        self.teardown.push(move || {
            if let Some(image) = image {
                removal_client.remove_image(&image.id).map_err(Error::from)?;
            }
            Ok(())
        });
        self.builds.push(build);
        outcome.map_err(Error::from)?;

        match self.builds.last() {
            Some(build) => Ok(build),
            None => Err(usage("no build recorded")),
        }
    }

    /// Runs a command through the built image's launcher entrypoint,
    /// failing on a non-zero exit.
    ///
    /// # Errors
    ///
    /// A structured command failure carrying stdout/stderr, or an I/O error
    /// when `docker` cannot be spawned.
    pub fn run(&self, command: &str) -> Result<CmdResult> {
        let argv = self.launcher_command(command);
        let result = cmd::run(&argv).map_err(Error::from)?;
        if result.failed() {
            return Err(Error::Common(ScabbardError::CommandFailed {
                command: argv.join(" "),
                output: result,
            }));
        }
        Ok(result)
    }

    /// Runs a command through the built image's launcher entrypoint; the
    /// returned result carries any failure instead of an error.
    ///
    /// # Errors
    ///
    /// An I/O error when `docker` cannot be spawned.
    pub fn run_unchecked(&self, command: &str) -> Result<CmdResult> {
        cmd::run(&self.launcher_command(command)).map_err(Error::from)
    }

    /// Runs a launcher command on its own thread, handing the result to
    /// `callback` there.
    ///
    /// Joining the thread is registered as a teardown action at the point of
    /// spawning, so the command and the callback (including any assertion
    /// panic inside it) complete before the transaction's teardown finishes.
    /// A non-zero exit fails the join.
    pub fn run_multi<F>(&mut self, command: &str, callback: F)
    where
        F: FnOnce(CmdResult) + Send + 'static,
    {
        self.spawn_multi(command, true, callback);
    }

    /// Like [`App::run_multi`], but the callback receives failed results
    /// too.
    pub fn run_multi_unchecked<F>(&mut self, command: &str, callback: F)
    where
        F: FnOnce(CmdResult) + Send + 'static,
    {
        self.spawn_multi(command, false, callback);
    }

    fn spawn_multi<F>(&mut self, command: &str, checked: bool, callback: F)
    where
        F: FnOnce(CmdResult) + Send + 'static,
    {
        let argv = self.launcher_command(command);
        let handle = std::thread::spawn(move || -> Result<()> {
            let result = cmd::run(&argv).map_err(Error::from)?;
            if checked && result.failed() {
                return Err(Error::Common(ScabbardError::CommandFailed {
                    command: argv.join(" "),
                    output: result,
                }));
            }
            callback(result);
            Ok(())
        });

        self.teardown.push(move || match handle.join() {
            Ok(outcome) => outcome,
            Err(panic) => Err(Error::TaskPanicked {
                message: panic_message(panic.as_ref()),
            }),
        });
    }

    /// Boots the last build's image as a container, exposing the given
    /// ports, and removes the container when `body` exits, normally or not.
    ///
    /// # Errors
    ///
    /// Usage error when no successful build exists; otherwise the body's
    /// error or a session failure.
    pub fn start_container<T, F>(&self, expose_ports: &[u16], body: F) -> Result<T>
    where
        F: FnOnce(&ContainerControl<'_>) -> Result<T>,
    {
        let image_id = self
            .last_build()?
            .image_id()
            .map_err(Error::from)?
            .to_string();
        let docker = Arc::clone(self.docker()?);
        ContainerBoot::new(&docker, image_id, expose_ports).call(body)
    }

    fn launcher_command(&self, command: &str) -> Vec<String> {
        vec![
            "docker".to_string(),
            "run".to_string(),
            "--rm".to_string(),
            "--entrypoint".to_string(),
            "/cnb/lifecycle/launcher".to_string(),
            self.image_name.clone(),
            command.to_string(),
        ]
    }
}

fn usage(message: &str) -> Error {
    Error::Common(ScabbardError::Usage {
        message: message.into(),
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "opaque panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serial_test::serial;

    use super::*;

    fn fixture_source() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("cat"), b"meow").expect("write");
        dir
    }

    #[test]
    fn builder_and_buildpacks_default_from_config() {
        let config = ScabbardConfig {
            default_builder: Some("heroku/builder:24".into()),
            default_buildpacks: vec!["heroku/ruby".into()],
            ..ScabbardConfig::default()
        };
        let app = App::new("some-app", config);

        assert_eq!(app.builder.as_deref(), Some("heroku/builder:24"));
        assert_eq!(app.buildpacks.len(), 1);
        assert!(app.image_name().starts_with("scabbard_image_"));
    }

    #[test]
    fn accessors_before_any_build_are_usage_errors() {
        let app = App::new("some-app", ScabbardConfig::default());

        assert!(app.last_build().is_err());
        assert!(app.stdout().is_err());
        assert!(app.stderr().is_err());
        assert!(app.success().is_err());
        assert!(app.app_dir().is_err());
    }

    #[test]
    fn transaction_with_unknown_source_lists_candidates() {
        let repos = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(repos.path().join("known-app")).expect("mkdir");
        let config = ScabbardConfig {
            repo_dirs: vec![repos.path().to_path_buf()],
            ..ScabbardConfig::default()
        };

        let mut app = App::new("missing-app", config);
        let error = app
            .transaction(|_| Ok(()))
            .expect_err("unknown source should fail");
        let message = error.to_string();
        assert!(message.contains("missing-app"));
        assert!(message.contains("known-app"));
    }

    #[test]
    #[serial]
    fn transaction_copies_source_into_working_directory() {
        let source = fixture_source();
        let mut app = App::new(source.path().to_string_lossy(), ScabbardConfig::default());

        app.transaction(|app| {
            let app_dir = app.app_dir()?.to_path_buf();
            assert!(app_dir.join("cat").exists());
            assert_ne!(app_dir, source.path());

            let cwd = std::env::current_dir().map_err(|source| {
                Error::Common(ScabbardError::Io {
                    path: PathBuf::from("."),
                    source,
                })
            })?;
            assert!(cwd.join("cat").exists());
            Ok(())
        })
        .expect("transaction");
    }

    #[test]
    #[serial]
    fn what_happens_in_a_transaction_stays_in_a_transaction() {
        let source = fixture_source();
        let mut app = App::new(source.path().to_string_lossy(), ScabbardConfig::default());

        let mut transaction_dir = PathBuf::new();
        app.transaction(|app| {
            transaction_dir = app.app_dir()?.to_path_buf();
            std::fs::write("dog", b"woof").map_err(|source| {
                Error::Common(ScabbardError::Io {
                    path: PathBuf::from("dog"),
                    source,
                })
            })?;
            Ok(())
        })
        .expect("transaction");

        assert!(!transaction_dir.exists());
        assert!(!source.path().join("dog").exists());
    }

    #[test]
    #[serial]
    fn teardown_runs_and_body_error_wins() {
        let source = fixture_source();
        let mut app = App::new(source.path().to_string_lossy(), ScabbardConfig::default());
        let ran = Arc::new(Mutex::new(Vec::new()));

        let error = app
            .transaction(|app| {
                let first = Arc::clone(&ran);
                app.on_teardown(move || {
                    first.lock().expect("lock").push("first");
                    Ok(())
                });
                let second = Arc::clone(&ran);
                app.on_teardown(move || {
                    second.lock().expect("lock").push("second");
                    Ok(())
                });
                Err::<(), _>(usage("body exploded"))
            })
            .expect_err("body error should surface");

        assert!(error.to_string().contains("body exploded"));
        assert_eq!(*ran.lock().expect("lock"), vec!["second", "first"]);
    }

    #[test]
    #[serial]
    fn teardown_failures_are_collected_after_all_actions_ran() {
        let source = fixture_source();
        let mut app = App::new(source.path().to_string_lossy(), ScabbardConfig::default());

        let error = app
            .transaction(|app| {
                app.on_teardown(|| Err(usage("nopenopenope")));
                app.on_teardown(|| Err(usage("houston we have a problem")));
                Ok(())
            })
            .expect_err("teardown failures should surface");

        let Error::Teardown(failures) = error else {
            unreachable!("expected a teardown aggregate");
        };
        assert_eq!(failures.len(), 2);
        let rendered = failures.to_string();
        assert!(rendered.contains("houston we have a problem"));
        assert!(rendered.contains("nopenopenope"));
    }

    #[test]
    #[serial]
    fn working_directory_is_restored_after_transaction() {
        let source = fixture_source();
        let before = std::env::current_dir().expect("cwd");

        let mut app = App::new(source.path().to_string_lossy(), ScabbardConfig::default());
        app.transaction(|_| Ok(())).expect("transaction");

        assert_eq!(std::env::current_dir().expect("cwd"), before);
    }

    #[test]
    fn panic_payload_messages_are_extracted() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new("boom".to_string());
        assert_eq!(panic_message(payload.as_ref()), "boom");
    }
}
