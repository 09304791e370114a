//! External command invocation and captured results.
//!
//! Every subprocess the harness spawns (`pack`, `docker run`, buildpack
//! packaging) funnels through [`run`] and comes back as a [`CmdResult`].

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScabbardError};

/// Immutable value capturing the outcome of one external command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdResult {
    /// Captured standard output, lossily decoded as UTF-8.
    pub stdout: String,
    /// Captured standard error, lossily decoded as UTF-8.
    pub stderr: String,
    /// Normalized exit status; `-1` when the process was killed by a signal.
    pub status: i32,
}

impl CmdResult {
    /// Creates a result from already-captured parts.
    #[must_use]
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, status: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            status,
        }
    }

    /// Converts the raw output of a finished [`std::process::Command`].
    #[must_use]
    pub fn from_output(output: &std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code().unwrap_or(-1),
        }
    }

    /// Returns whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.status == 0
    }

    /// Returns whether the command exited with a non-zero status.
    #[must_use]
    pub const fn failed(&self) -> bool {
        !self.success()
    }
}

/// Runs an external command to completion, capturing stdout, stderr, and the
/// exit status.
///
/// The first element of `argv` is the program; the rest are passed as-is, so
/// no shell quoting is involved.
///
/// # Errors
///
/// Returns an error if `argv` is empty or the process cannot be spawned. A
/// non-zero exit status is not an error at this layer; callers inspect the
/// returned [`CmdResult`].
pub fn run(argv: &[String]) -> Result<CmdResult> {
    run_inner(argv, None)
}

/// Like [`run`], but with the child's working directory set to `dir`.
///
/// # Errors
///
/// Same conditions as [`run`].
pub fn run_in(argv: &[String], dir: &Path) -> Result<CmdResult> {
    run_inner(argv, Some(dir))
}

fn run_inner(argv: &[String], dir: Option<&Path>) -> Result<CmdResult> {
    let Some((program, args)) = argv.split_first() else {
        return Err(ScabbardError::Usage {
            message: "cannot run an empty command".into(),
        });
    };

    tracing::debug!(?argv, "spawning command");

    let mut command = Command::new(program);
    let _ = command.args(args);
    if let Some(dir) = dir {
        let _ = command.current_dir(dir);
    }

    let output = command.output().map_err(|source| ScabbardError::Io {
        path: PathBuf::from(program),
        source,
    })?;

    let result = CmdResult::from_output(&output);
    tracing::debug!(status = result.status, "command finished");
    Ok(result)
}
