//! Environment and image leak detection.
//!
//! The daemon's image namespace and the process environment are shared by
//! every test in a run; nothing enforces isolation, so suites record a
//! snapshot up front and check it after the fact:
//!
//! ```no_run
//! use scabbard::leak::LeakCheck;
//! use scabbard::{DockerClient, ScabbardConfig};
//!
//! # fn main() -> scabbard::Result<()> {
//! let docker = DockerClient::connect()?;
//! let config = ScabbardConfig::default();
//! let snapshot = LeakCheck::record(&docker, &config)?;
//! // … run the suite …
//! snapshot.check(&docker)?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use scabbard_common::config::ScabbardConfig;
use scabbard_docker::client::DockerClient;
use scabbard_docker::image::ImageHandle;

use crate::error::{Error, Result};

/// Environment variable that opts image-leak checking in; env checking is
/// cheap and always runs, image listing is not.
pub const CHECK_DOCKER_ENV: &str = "SCABBARD_CHECK_DOCKER";

/// One environment variable whose value differs between two captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvChange {
    /// The variable's name.
    pub key: String,
    /// Value at capture time; `None` when the variable was unset.
    pub before: Option<String>,
    /// Value at diff time; `None` when the variable was unset.
    pub after: Option<String>,
}

impl fmt::Display for EnvChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} changed from {} to {}",
            self.key,
            render_value(self.before.as_deref()),
            render_value(self.after.as_deref())
        )
    }
}

fn render_value(value: Option<&str>) -> String {
    value.map_or_else(|| "<unset>".to_string(), |value| format!("'{value}'"))
}

/// Snapshot of the process environment, diffable against a later state.
#[derive(Debug, Clone)]
pub struct EnvDiff {
    before: BTreeMap<String, String>,
    skip_keys: BTreeSet<String>,
}

impl EnvDiff {
    /// Captures the current process environment, minus the skip-list.
    #[must_use]
    pub fn capture(skip_keys: &[String]) -> Self {
        Self::with_before(std::env::vars().collect(), skip_keys)
    }

    /// Builds a snapshot from an explicit map. This is the seam tests use
    /// instead of mutating the real process environment.
    #[must_use]
    pub fn with_before(before: BTreeMap<String, String>, skip_keys: &[String]) -> Self {
        Self {
            before,
            skip_keys: skip_keys.iter().cloned().collect(),
        }
    }

    /// Diffs the snapshot against the current process environment.
    #[must_use]
    pub fn changes(&self) -> Vec<EnvChange> {
        self.changes_against(&std::env::vars().collect())
    }

    /// Diffs the snapshot against an explicit map.
    ///
    /// Every key in the union of both maps (minus the skip-list) whose value
    /// differs, including keys that appeared or disappeared, is reported.
    #[must_use]
    pub fn changes_against(&self, now: &BTreeMap<String, String>) -> Vec<EnvChange> {
        let keys: BTreeSet<&String> = self
            .before
            .keys()
            .chain(now.keys())
            .filter(|key| !self.skip_keys.contains(*key))
            .collect();

        keys.into_iter()
            .filter_map(|key| {
                let before = self.before.get(key);
                let after = now.get(key);
                if before == after {
                    None
                } else {
                    Some(EnvChange {
                        key: key.clone(),
                        before: before.cloned(),
                        after: after.cloned(),
                    })
                }
            })
            .collect()
    }

    /// Whether the current environment differs from the snapshot.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.changes().is_empty()
    }

    /// Whether the current environment matches the snapshot.
    #[must_use]
    pub fn same(&self) -> bool {
        !self.changed()
    }
}

/// Snapshot of the daemon's image-ID set, diffable against a later state.
#[derive(Debug, Clone)]
pub struct ImageDiff {
    before_ids: BTreeSet<String>,
}

impl ImageDiff {
    /// Captures the daemon's current image IDs.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be reached.
    pub fn capture(docker: &DockerClient) -> Result<Self> {
        Ok(Self::with_before(docker.image_ids()?))
    }

    /// Builds a snapshot from an explicit ID set.
    #[must_use]
    pub fn with_before(ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            before_ids: ids.into_iter().collect(),
        }
    }

    /// Re-lists the daemon's images and diffs against the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be reached.
    pub fn diff(&self, docker: &DockerClient) -> Result<ImageDiffValue> {
        Ok(self.diff_against(docker.images()?))
    }

    /// Diffs an explicit image listing against the snapshot.
    #[must_use]
    pub fn diff_against(&self, now: Vec<ImageHandle>) -> ImageDiffValue {
        ImageDiffValue {
            leaked: now
                .into_iter()
                .filter(|image| !self.before_ids.contains(&image.id))
                .collect(),
        }
    }
}

/// Result of comparing two image snapshots.
#[derive(Debug, Clone)]
pub struct ImageDiffValue {
    leaked: Vec<ImageHandle>,
}

impl ImageDiffValue {
    /// Images present now that were absent at capture time.
    #[must_use]
    pub fn leaked(&self) -> &[ImageHandle] {
        &self.leaked
    }

    /// Whether any image appeared.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.leaked.is_empty()
    }

    /// Whether the image set is unchanged.
    #[must_use]
    pub fn same(&self) -> bool {
        !self.changed()
    }
}

impl fmt::Display for ImageDiffValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for image in &self.leaked {
            writeln!(f, "  {image}")?;
        }
        Ok(())
    }
}

/// Combined environment and image snapshot for one test run.
///
/// `check` is a method on the value `record` returns, so checking without a
/// prior recording is unrepresentable rather than a silent "no leak".
#[derive(Debug)]
pub struct LeakCheck {
    env: EnvDiff,
    images: ImageDiff,
}

impl LeakCheck {
    /// Records the current environment (minus the config's skip-list) and
    /// the daemon's image-ID set.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be reached.
    pub fn record(docker: &DockerClient, config: &ScabbardConfig) -> Result<Self> {
        Ok(Self {
            env: EnvDiff::capture(&config.skip_env_keys),
            images: ImageDiff::capture(docker)?,
        })
    }

    /// Re-captures and diffs. Environment drift always fails; image drift
    /// fails only when [`CHECK_DOCKER_ENV`] is set in the environment.
    ///
    /// # Errors
    ///
    /// [`Error::EnvMutated`] or [`Error::ImagesLeaked`] on drift.
    pub fn check(&self, docker: &DockerClient) -> Result<()> {
        self.check_with(docker, std::env::var_os(CHECK_DOCKER_ENV).is_some())
    }

    /// Re-captures and diffs, with image checking requested explicitly.
    ///
    /// # Errors
    ///
    /// [`Error::EnvMutated`] or [`Error::ImagesLeaked`] on drift.
    pub fn check_with(&self, docker: &DockerClient, check_images: bool) -> Result<()> {
        let changes = self.env.changes();
        if !changes.is_empty() {
            return Err(Error::EnvMutated { changes });
        }

        if check_images {
            let diff = self.images.diff(docker)?;
            if diff.changed() {
                return Err(Error::ImagesLeaked {
                    images: diff.leaked().to_vec(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn identical_maps_have_no_changes() {
        let diff = EnvDiff::with_before(map(&[("PATH", "/bin")]), &[]);
        assert!(diff.changes_against(&map(&[("PATH", "/bin")])).is_empty());
    }

    #[test]
    fn changed_value_is_reported_with_before_and_after() {
        let diff = EnvDiff::with_before(map(&[("LANG", "C")]), &[]);
        let changes = diff.changes_against(&map(&[("LANG", "en_US.UTF-8")]));

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, "LANG");
        assert_eq!(changes[0].before.as_deref(), Some("C"));
        assert_eq!(changes[0].after.as_deref(), Some("en_US.UTF-8"));
    }

    #[test]
    fn appearing_and_disappearing_keys_are_changes() {
        let diff = EnvDiff::with_before(map(&[("GONE", "1")]), &[]);
        let changes = diff.changes_against(&map(&[("NEW", "2")]));

        assert_eq!(changes.len(), 2);
        let gone = changes.iter().find(|c| c.key == "GONE").expect("GONE");
        assert_eq!(gone.after, None);
        let new = changes.iter().find(|c| c.key == "NEW").expect("NEW");
        assert_eq!(new.before, None);
    }

    #[test]
    fn skip_keys_are_ignored() {
        let diff = EnvDiff::with_before(
            map(&[("API_KEY", "old"), ("LANG", "C")]),
            &["API_KEY".to_string()],
        );
        let changes = diff.changes_against(&map(&[("API_KEY", "new"), ("LANG", "C")]));
        assert!(changes.is_empty());
    }

    #[test]
    fn change_display_renders_unset_values() {
        let change = EnvChange {
            key: "NEW".into(),
            before: None,
            after: Some("2".into()),
        };
        assert_eq!(change.to_string(), "NEW changed from <unset> to '2'");
    }

    fn image(id: &str) -> ImageHandle {
        ImageHandle {
            id: id.to_string(),
            repo_tags: vec![format!("{id}:latest")],
        }
    }

    #[test]
    fn new_image_id_appears_in_leaked_set() {
        let diff = ImageDiff::with_before(vec!["sha256:aaa".to_string()]);
        let value = diff.diff_against(vec![image("sha256:aaa"), image("sha256:bbb")]);

        assert!(value.changed());
        assert_eq!(value.leaked().len(), 1);
        assert_eq!(value.leaked()[0].id, "sha256:bbb");
    }

    #[test]
    fn unchanged_image_set_is_same() {
        let diff = ImageDiff::with_before(vec!["sha256:aaa".to_string()]);
        let value = diff.diff_against(vec![image("sha256:aaa")]);
        assert!(value.same());
    }

    #[test]
    fn removed_images_are_not_leaks() {
        let diff = ImageDiff::with_before(vec!["sha256:aaa".to_string(), "sha256:bbb".to_string()]);
        let value = diff.diff_against(vec![image("sha256:aaa")]);
        assert!(value.same());
    }
}
