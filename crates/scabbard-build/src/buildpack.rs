//! Buildpack references and local buildpack packaging.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use scabbard_common::cmd;
use scabbard_common::error::ScabbardError;
use scabbard_docker::client::DockerClient;

use crate::error::Result;

/// A buildpack reference handed to `pack build`.
///
/// Either a literal reference (`heroku/ruby`, a registry URI, a directory
/// path) passed through unchanged, or a locally packaged buildpack whose
/// image is produced on first resolution.
#[derive(Debug, Clone)]
pub enum BuildpackRef {
    /// A literal reference string.
    Literal(String),
    /// A locally packaged buildpack resolving to `docker://<image>`.
    Packaged(Arc<LocalBuildpack>),
}

impl BuildpackRef {
    /// Resolves the reference to the string `pack build` receives.
    ///
    /// # Errors
    ///
    /// Packaged buildpacks are built on first resolution, which can fail.
    pub fn resolve(&self) -> Result<String> {
        match self {
            Self::Literal(reference) => Ok(reference.clone()),
            Self::Packaged(buildpack) => buildpack.name(),
        }
    }
}

impl From<&str> for BuildpackRef {
    fn from(reference: &str) -> Self {
        Self::Literal(reference.to_string())
    }
}

impl From<String> for BuildpackRef {
    fn from(reference: String) -> Self {
        Self::Literal(reference)
    }
}

impl From<Arc<LocalBuildpack>> for BuildpackRef {
    fn from(buildpack: Arc<LocalBuildpack>) -> Self {
        Self::Packaged(buildpack)
    }
}

/// Packages a buildpack in a local directory into an image `pack` can use
/// natively.
///
/// Packaging is lazy: nothing runs until [`LocalBuildpack::name`] (or
/// [`LocalBuildpack::build`]) is first called. The generated image name is
/// fixed at construction so [`LocalBuildpack::teardown`] can always find it.
#[derive(Debug)]
pub struct LocalBuildpack {
    directory: PathBuf,
    image_name: String,
    built: OnceLock<()>,
}

impl LocalBuildpack {
    /// Creates a packager for the buildpack in `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            image_name: format!(
                "scabbard_local_buildpack_{}",
                uuid::Uuid::new_v4().simple()
            ),
            built: OnceLock::new(),
        }
    }

    /// Returns the image name the buildpack packages into.
    #[must_use]
    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    /// Returns whether packaging has run.
    #[must_use]
    pub fn built(&self) -> bool {
        self.built.get().is_some()
    }

    /// Returns the `docker://` reference, packaging the buildpack first if
    /// needed.
    ///
    /// # Errors
    ///
    /// Fails when packaging fails; see [`LocalBuildpack::build`].
    pub fn name(&self) -> Result<String> {
        self.build()?;
        Ok(format!("docker://{}", self.image_name))
    }

    /// Packages the buildpack directory into an image. Idempotent.
    ///
    /// Runs the directory's `build.sh` first when present, then
    /// `pack buildpack package … --format=image` against its `package.toml`.
    ///
    /// # Errors
    ///
    /// A missing directory or `package.toml` is a usage error; a failing
    /// subprocess surfaces as a structured command failure.
    pub fn build(&self) -> Result<()> {
        if self.built() {
            return Ok(());
        }
        if !self.directory.is_dir() {
            return Err(ScabbardError::Usage {
                message: format!("must be a directory: {}", self.directory.display()),
            }
            .into());
        }

        self.run_build_script()?;
        self.package()?;

        let _ = self.built.set(());
        Ok(())
    }

    /// Removes the packaged image. Safe to call whether or not packaging
    /// ever ran.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon refuses the removal.
    pub fn teardown(&self, docker: &DockerClient) -> Result<()> {
        if !self.built() {
            return Ok(());
        }
        docker.remove_image(&self.image_name)?;
        Ok(())
    }

    fn run_build_script(&self) -> Result<()> {
        let build_sh = self.directory.join("build.sh");
        if !build_sh.exists() {
            return Ok(());
        }

        let argv = vec!["bash".to_string(), build_sh.display().to_string()];
        let result = cmd::run_in(&argv, &self.directory)?;
        if result.failed() {
            return Err(ScabbardError::CommandFailed {
                command: argv.join(" "),
                output: result,
            }
            .into());
        }
        Ok(())
    }

    fn package(&self) -> Result<()> {
        let package_toml = self.directory.join("package.toml");
        if !package_toml.exists() {
            return Err(ScabbardError::Usage {
                message: format!("must contain package.toml: {}", self.directory.display()),
            }
            .into());
        }
        crate::pack::ensure_pack()?;

        let argv = vec![
            crate::PACK_BIN.to_string(),
            "buildpack".to_string(),
            "package".to_string(),
            self.image_name.clone(),
            "--config".to_string(),
            package_toml.display().to_string(),
            "--format=image".to_string(),
        ];
        tracing::debug!(command = ?argv, "packaging buildpack");
        let result = cmd::run(&argv)?;
        if result.failed() {
            return Err(ScabbardError::CommandFailed {
                command: argv.join(" "),
                output: result,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_ref_resolves_to_itself() {
        let reference = BuildpackRef::from("heroku/ruby");
        assert_eq!(reference.resolve().expect("resolve"), "heroku/ruby");
    }

    #[test]
    fn image_name_is_unique_per_packager() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = LocalBuildpack::new(dir.path());
        let second = LocalBuildpack::new(dir.path());
        assert!(first.image_name().starts_with("scabbard_local_buildpack_"));
        assert_ne!(first.image_name(), second.image_name());
    }

    #[test]
    fn build_missing_directory_is_usage_error() {
        let buildpack = LocalBuildpack::new("/nonexistent/buildpack");
        let error = buildpack.build().expect_err("missing dir should fail");
        assert!(error.to_string().contains("must be a directory"));
        assert!(!buildpack.built());
    }

    #[test]
    fn build_missing_package_toml_is_usage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let buildpack = LocalBuildpack::new(dir.path());
        let error = buildpack.build().expect_err("missing package.toml should fail");
        assert!(error.to_string().contains("package.toml"));
    }

    #[test]
    fn teardown_without_build_is_a_no_op() {
        let client = DockerClient::connect().expect("client");
        let buildpack = LocalBuildpack::new("/nonexistent/buildpack");
        buildpack.teardown(&client).expect("teardown should no-op");
    }
}
