//! Builds an image with `pack` and Cloud Native Buildpacks.
//!
//! One [`PackBuild`] records one invocation: the fully determined command
//! line, the captured [`CmdResult`], and, on success, a handle to the
//! produced image, whose removal [`PackBuild::teardown`] owns.

use std::collections::BTreeMap;
use std::path::PathBuf;

use scabbard_common::cmd::{self, CmdResult};
use scabbard_common::error::ScabbardError;
use scabbard_docker::client::DockerClient;
use scabbard_docker::image::ImageHandle;

use crate::buildpack::BuildpackRef;
use crate::error::Result;

/// Inputs that fully determine one `pack build` invocation.
#[derive(Debug, Clone, Default)]
pub struct PackConfig {
    /// Directory containing the application source to build.
    pub app_dir: PathBuf,
    /// Name the produced image is tagged with.
    pub image_name: String,
    /// Builder image passed as `-B`, when set.
    pub builder: Option<String>,
    /// Ordered buildpack references, comma-joined on the command line.
    pub buildpacks: Vec<BuildpackRef>,
    /// Build-time environment variables, one `--env KEY=VALUE` each. Keyed
    /// by a `BTreeMap` so the flag order never depends on insertion order.
    pub env: BTreeMap<String, String>,
}

/// One invocation of the external builder.
#[derive(Debug)]
pub struct PackBuild {
    app_dir: PathBuf,
    image_name: String,
    builder: Option<String>,
    buildpacks: Vec<String>,
    env: BTreeMap<String, String>,
    result: Option<CmdResult>,
    image: Option<ImageHandle>,
}

impl PackBuild {
    /// Creates a build from its configuration, resolving every buildpack
    /// reference to a literal string.
    ///
    /// # Errors
    ///
    /// Fails when a packaged buildpack reference cannot be built.
    pub fn new(config: PackConfig) -> Result<Self> {
        let buildpacks = config
            .buildpacks
            .iter()
            .map(BuildpackRef::resolve)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            app_dir: config.app_dir,
            image_name: config.image_name,
            builder: config.builder,
            buildpacks,
            env: config.env,
            result: None,
            image: None,
        })
    }

    /// Returns the exact command line `call` executes. Deterministic: the
    /// same inputs always produce the same vector.
    #[must_use]
    pub fn command(&self) -> Vec<String> {
        let mut argv = vec![
            crate::PACK_BIN.to_string(),
            "build".to_string(),
            self.image_name.clone(),
            "--path".to_string(),
            self.app_dir.display().to_string(),
        ];
        if let Some(builder) = &self.builder {
            argv.push("-B".to_string());
            argv.push(builder.clone());
        }
        if !self.buildpacks.is_empty() {
            argv.push("--buildpack".to_string());
            argv.push(self.buildpacks.join(","));
        }
        for (key, value) in &self.env {
            argv.push("--env".to_string());
            argv.push(format!("{key}={value}"));
        }
        argv
    }

    /// Runs the build, failing on a non-zero exit.
    ///
    /// On success the produced image is resolved from the daemon by name and
    /// recorded. On failure the handle stays unset and the error embeds the
    /// full command, stdout, and stderr.
    ///
    /// # Errors
    ///
    /// Fails when `pack` is missing, cannot be spawned, exits non-zero, or
    /// the produced image cannot be resolved.
    pub fn call(&mut self, docker: &DockerClient) -> Result<CmdResult> {
        let result = self.execute(docker)?;
        if result.failed() {
            return Err(ScabbardError::CommandFailed {
                command: self.command().join(" "),
                output: result,
            }
            .into());
        }
        Ok(result)
    }

    /// Runs the build; a non-zero exit is carried by the returned
    /// [`CmdResult`] instead of an error.
    ///
    /// # Errors
    ///
    /// Fails only when `pack` is missing or cannot be spawned, or when a
    /// successful build's image cannot be resolved.
    pub fn try_call(&mut self, docker: &DockerClient) -> Result<CmdResult> {
        self.execute(docker)
    }

    fn execute(&mut self, docker: &DockerClient) -> Result<CmdResult> {
        ensure_pack()?;
        let argv = self.command();
        tracing::debug!(command = ?argv, "invoking pack");

        let result = cmd::run(&argv)?;
        tracing::debug!(status = result.status, "pack finished");

        if result.success() {
            self.image = Some(docker.image_by_name(&self.image_name)?);
        } else {
            self.image = None;
        }
        self.result = Some(result.clone());
        Ok(result)
    }

    /// Returns the captured result of the last invocation.
    ///
    /// # Errors
    ///
    /// Querying before `call` has ever executed is a usage error, distinct
    /// from a build failure.
    pub fn result(&self) -> Result<&CmdResult> {
        self.result.as_ref().ok_or_else(|| {
            ScabbardError::Usage {
                message: "no build result recorded; execute `call` first".into(),
            }
            .into()
        })
    }

    /// Captured stdout of the last invocation.
    ///
    /// # Errors
    ///
    /// Usage error before `call`.
    pub fn stdout(&self) -> Result<&str> {
        Ok(&self.result()?.stdout)
    }

    /// Captured stderr of the last invocation.
    ///
    /// # Errors
    ///
    /// Usage error before `call`.
    pub fn stderr(&self) -> Result<&str> {
        Ok(&self.result()?.stderr)
    }

    /// Whether the last invocation succeeded.
    ///
    /// # Errors
    ///
    /// Usage error before `call`.
    pub fn success(&self) -> Result<bool> {
        Ok(self.result()?.success())
    }

    /// Whether the last invocation failed.
    ///
    /// # Errors
    ///
    /// Usage error before `call`.
    pub fn failed(&self) -> Result<bool> {
        Ok(self.result()?.failed())
    }

    /// The image the build produced, when it succeeded.
    #[must_use]
    pub fn image_handle(&self) -> Option<&ImageHandle> {
        self.image.as_ref()
    }

    /// ID of the produced image.
    ///
    /// # Errors
    ///
    /// A usage error when no image was produced (build failed or never ran).
    pub fn image_id(&self) -> Result<&str> {
        self.image.as_ref().map(|image| image.id.as_str()).ok_or_else(|| {
            ScabbardError::Usage {
                message: "no image ID; the build did not run or did not succeed".into(),
            }
            .into()
        })
    }

    /// Name the produced image is tagged with.
    #[must_use]
    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    /// Removes the produced image. Idempotent and safe to call whether or
    /// not a build ever ran or succeeded: removal happens iff a handle was
    /// resolved.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon refuses the removal.
    pub fn teardown(&self, docker: &DockerClient) -> Result<()> {
        if let Some(image) = &self.image {
            docker.remove_image(&image.id)?;
        }
        Ok(())
    }
}

/// Generates a unique image name for one fixture build.
#[must_use]
pub fn generated_image_name() -> String {
    format!("scabbard_image_{}", uuid::Uuid::new_v4().simple())
}

/// Verifies the `pack` CLI is on `PATH`.
///
/// # Errors
///
/// A descriptive usage error when the binary is absent.
pub fn ensure_pack() -> Result<()> {
    if which::which(crate::PACK_BIN).is_err() {
        return Err(ScabbardError::Usage {
            message: format!(
                "`{}` CLI not found on PATH; install it from https://buildpacks.io",
                crate::PACK_BIN
            ),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_with_env(pairs: &[(&str, &str)]) -> PackBuild {
        let mut env = BTreeMap::new();
        for (key, value) in pairs {
            let _ = env.insert((*key).to_string(), (*value).to_string());
        }
        PackBuild::new(PackConfig {
            app_dir: PathBuf::from("/tmp/app"),
            image_name: "scabbard_image_test".into(),
            builder: Some("x".into()),
            buildpacks: vec![BuildpackRef::from("a"), BuildpackRef::from("b")],
            env,
        })
        .expect("literal refs always resolve")
    }

    fn count(argv: &[String], needle: &str) -> usize {
        argv.iter().filter(|arg| *arg == needle).count()
    }

    #[test]
    fn command_contains_builder_and_buildpacks_once() {
        let build = build_with_env(&[]);
        let argv = build.command();

        assert_eq!(count(&argv, "-B"), 1);
        assert_eq!(count(&argv, "x"), 1);
        assert_eq!(count(&argv, "--buildpack"), 1);
        assert_eq!(count(&argv, "a,b"), 1);
        assert_eq!(count(&argv, "--path"), 1);
    }

    #[test]
    fn command_ignores_env_insertion_order() {
        let first = build_with_env(&[("ALPHA", "1"), ("BETA", "2")]);
        let second = build_with_env(&[("BETA", "2"), ("ALPHA", "1")]);
        assert_eq!(first.command(), second.command());
    }

    #[test]
    fn command_emits_one_env_flag_per_entry() {
        let build = build_with_env(&[("ALPHA", "1"), ("BETA", "2")]);
        let argv = build.command();

        assert_eq!(count(&argv, "--env"), 2);
        assert_eq!(count(&argv, "ALPHA=1"), 1);
        assert_eq!(count(&argv, "BETA=2"), 1);
    }

    #[test]
    fn command_without_builder_omits_flag() {
        let build = PackBuild::new(PackConfig {
            app_dir: PathBuf::from("/tmp/app"),
            image_name: "scabbard_image_test".into(),
            builder: None,
            buildpacks: vec![BuildpackRef::from("a")],
            env: BTreeMap::new(),
        })
        .expect("literal refs always resolve");
        assert_eq!(count(&build.command(), "-B"), 0);
    }

    #[test]
    fn result_accessors_before_call_are_usage_errors() {
        let build = build_with_env(&[]);

        assert!(build.result().is_err());
        assert!(build.stdout().is_err());
        assert!(build.stderr().is_err());
        assert!(build.success().is_err());
        assert!(build.failed().is_err());
        assert!(build.image_id().is_err());
        assert!(build.image_handle().is_none());
    }

    #[test]
    fn teardown_before_call_is_a_no_op() {
        let client = DockerClient::connect().expect("client");
        let build = build_with_env(&[]);
        build.teardown(&client).expect("teardown should no-op");
    }

    #[test]
    fn generated_image_names_are_unique() {
        let first = generated_image_name();
        let second = generated_image_name();
        assert!(first.starts_with("scabbard_image_"));
        assert_ne!(first, second);
    }
}
