//! Source-path resolution and recursive tree copying.

use std::path::{Path, PathBuf};

use crate::error::{Result, ScabbardError};

/// Resolves a fixture source reference to an existing directory.
///
/// A reference that is already a directory on disk is returned as-is.
/// Otherwise it must match, by basename, exactly one immediate child of the
/// configured repo directories.
///
/// # Errors
///
/// Returns a usage error when no child matches (listing every candidate
/// found) or when more than one does.
pub fn resolve_path(reference: &str, repo_dirs: &[PathBuf]) -> Result<PathBuf> {
    let direct = Path::new(reference);
    if direct.is_dir() {
        return Ok(direct.to_path_buf());
    }

    let mut candidates = Vec::new();
    for dir in repo_dirs {
        let entries = std::fs::read_dir(dir).map_err(|source| ScabbardError::Io {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| ScabbardError::Io {
                path: dir.clone(),
                source,
            })?;
            candidates.push(entry.path());
        }
    }

    let matches: Vec<&PathBuf> = candidates
        .iter()
        .filter(|path| path.file_name().is_some_and(|name| name == reference))
        .collect();

    match matches.as_slice() {
        [single] => Ok((*single).clone()),
        [] => Err(ScabbardError::Usage {
            message: format!(
                "no such source directory {reference:?}; known sources: {}",
                basenames(&candidates).join(", ")
            ),
        }),
        many => Err(ScabbardError::Usage {
            message: format!(
                "source name {reference:?} is ambiguous; matches: {}",
                many.iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }),
    }
}

fn basenames(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// Recursively copies a directory tree, including empty directories.
///
/// Regular-file permission bits carry over through [`std::fs::copy`];
/// directory permissions are copied explicitly. Symlinks are recreated, not
/// followed.
///
/// # Errors
///
/// Returns an error if any directory cannot be read or any entry cannot be
/// copied.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst).map_err(|source| ScabbardError::Io {
        path: dst.to_path_buf(),
        source,
    })?;
    let metadata = std::fs::metadata(src).map_err(|source| ScabbardError::Io {
        path: src.to_path_buf(),
        source,
    })?;
    std::fs::set_permissions(dst, metadata.permissions()).map_err(|source| ScabbardError::Io {
        path: dst.to_path_buf(),
        source,
    })?;

    let entries = std::fs::read_dir(src).map_err(|source| ScabbardError::Io {
        path: src.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ScabbardError::Io {
            path: src.to_path_buf(),
            source,
        })?;
        let target = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|source| ScabbardError::Io {
            path: entry.path(),
            source,
        })?;

        if file_type.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            copy_symlink(&entry.path(), &target)?;
        } else {
            let _ = std::fs::copy(entry.path(), &target).map_err(|source| ScabbardError::Io {
                path: entry.path(),
                source,
            })?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let link = std::fs::read_link(src).map_err(|source| ScabbardError::Io {
        path: src.to_path_buf(),
        source,
    })?;
    std::os::unix::fs::symlink(link, dst).map_err(|source| ScabbardError::Io {
        path: dst.to_path_buf(),
        source,
    })
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    // No portable way to recreate the link; fall back to copying the target.
    let _ = std::fs::copy(src, dst).map_err(|source| ScabbardError::Io {
        path: src.to_path_buf(),
        source,
    })?;
    Ok(())
}
