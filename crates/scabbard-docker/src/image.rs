//! Handles to daemon-managed images.

use std::fmt;

/// Handle to an image resolved from the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    /// Content-addressed image ID (`sha256:…`).
    pub id: String,
    /// Repository tags attached to the image.
    pub repo_tags: Vec<String>,
}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tags: {:?}, id: {}", self.repo_tags, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_tags_and_id() {
        let handle = ImageHandle {
            id: "sha256:abc123".into(),
            repo_tags: vec!["app:latest".into()],
        };
        let rendered = handle.to_string();
        assert!(rendered.contains("app:latest"));
        assert!(rendered.contains("sha256:abc123"));
    }
}
