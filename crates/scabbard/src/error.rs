//! Error types for the harness crate.

use std::fmt;

use scabbard_build::error::BuildError;
use scabbard_common::error::ScabbardError;
use scabbard_docker::error::DockerError;
use scabbard_docker::image::ImageHandle;
use thiserror::Error;

use crate::leak::EnvChange;

/// Errors surfaced by harness operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Shared workspace error (I/O, usage, external-command failure).
    #[error(transparent)]
    Common(#[from] ScabbardError),

    /// Docker daemon interaction failed.
    #[error(transparent)]
    Docker(#[from] DockerError),

    /// Build invocation failed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// One or more teardown actions failed.
    #[error(transparent)]
    Teardown(#[from] TeardownFailures),

    /// The process environment changed between `record` and `check`.
    #[error("environment mutated during the test run:\n{}", render_lines(.changes))]
    EnvMutated {
        /// Every key whose value differs, with before/after values.
        changes: Vec<EnvChange>,
    },

    /// Images appeared in the daemon between `record` and `check`.
    #[error(
        "docker images leaked during the test run; tests are generating images that were not cleaned up:\n{}",
        render_lines(.images)
    )]
    ImagesLeaked {
        /// The newly appeared images with their tags.
        images: Vec<ImageHandle>,
    },

    /// A background command task panicked.
    #[error("background command task panicked: {message}")]
    TaskPanicked {
        /// The panic payload, when it was a string.
        message: String,
    },

    /// An HTTP request to a running container failed.
    #[error("HTTP request failed: {source}")]
    Http {
        /// Underlying client error.
        #[from]
        source: reqwest::Error,
    },
}

/// Convenience alias used throughout the harness.
pub type Result<T> = std::result::Result<T, Error>;

fn render_lines<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| format!("  {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Aggregate of every teardown-action failure from one transaction.
///
/// All registered actions run before this value is produced, so it holds
/// every failure in execution order, not just the first or last one.
#[derive(Debug, Error)]
#[error("{}", render_failures(.failures))]
pub struct TeardownFailures {
    failures: Vec<Error>,
}

impl TeardownFailures {
    pub(crate) fn new(failures: Vec<Error>) -> Self {
        Self { failures }
    }

    /// The individual failures, in the order the actions ran.
    #[must_use]
    pub fn failures(&self) -> &[Error] {
        &self.failures
    }

    /// Number of failed actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether the aggregate is empty (never true for a returned value).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

fn render_failures(failures: &[Error]) -> String {
    let mut rendered = format!("{} teardown action(s) failed:", failures.len());
    for (index, failure) in failures.iter().enumerate() {
        rendered.push_str(&format!("\n  {}: {failure}", index + 1));
    }
    rendered
}
