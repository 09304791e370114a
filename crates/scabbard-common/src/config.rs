//! Harness configuration shared by every test fixture in a process.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Immutable defaults injected into fixture constructors.
///
/// A test suite assembles one value at startup and passes it (cloned) into
/// each fixture; nothing here is read from ambient global state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScabbardConfig {
    /// Builder image passed as `pack build -B` when a fixture does not set
    /// its own.
    pub default_builder: Option<String>,
    /// Literal buildpack references applied when a fixture does not set its
    /// own. Locally packaged buildpacks own a daemon image and its teardown,
    /// so they are passed to fixtures explicitly instead.
    pub default_buildpacks: Vec<String>,
    /// Directories whose immediate children may be referenced by basename
    /// when naming a fixture source.
    pub repo_dirs: Vec<PathBuf>,
    /// Environment variable keys the leak detector ignores (credentials and
    /// other values expected to vary).
    pub skip_env_keys: Vec<String>,
}
