//! Read-only repository context assembled before generation.

use serde::{Deserialize, Serialize};

/// A curated file included verbatim (possibly truncated) in the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFile {
    /// Repository-relative path
    pub path: String,
    /// Decoded text content
    pub content: String,
    /// Whether `content` was cut to the configured bound
    #[serde(default)]
    pub truncated: bool,
}

/// Snapshot of a repository, built fresh for each run.
///
/// Never cached across runs: the repository may have changed since the
/// previous invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    /// Branch the run targets
    pub branch: String,
    /// Bounded sample of existing blob paths, in tree order
    pub file_list: Vec<String>,
    /// Whether `file_list` was cut to the configured bound
    #[serde(default)]
    pub file_list_truncated: bool,
    /// Curated important files, in curation order
    pub key_files: Vec<KeyFile>,
    /// Repository was just created (or is empty); prompts use new-project framing
    pub is_new: bool,
}

impl RepositorySnapshot {
    /// Snapshot for a repository that has no meaningful content yet.
    #[must_use]
    pub fn new_project(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            file_list: Vec::new(),
            file_list_truncated: false,
            key_files: Vec::new(),
            is_new: true,
        }
    }

    /// Snapshot of an existing repository.
    #[must_use]
    pub fn existing(
        branch: impl Into<String>,
        file_list: Vec<String>,
        file_list_truncated: bool,
        key_files: Vec<KeyFile>,
    ) -> Self {
        Self {
            branch: branch.into(),
            file_list,
            file_list_truncated,
            key_files,
            is_new: false,
        }
    }

    /// Whether a path is present in the sampled file list.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.file_list.iter().any(|p| p == path)
    }
}
