//! Repository remote interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;

/// Branch used when a repository reports no default branch.
pub const FALLBACK_BRANCH: &str = "main";

/// Repository metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub name: String,
    #[serde(default)]
    pub default_branch: Option<String>,
    pub html_url: String,
}

impl RepoInfo {
    /// Default branch, falling back to `main` when unset.
    pub fn branch(&self) -> &str {
        self.default_branch
            .as_deref()
            .filter(|b| !b.is_empty())
            .unwrap_or(FALLBACK_BRANCH)
    }
}

/// A file as currently stored on the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Git blob hash; the optimistic-concurrency token for writes
    pub content_hash: String,
    /// Decoded text, `None` for non-UTF-8 content
    pub text: Option<String>,
}

/// A conditional write.
#[derive(Debug, Clone, Copy)]
pub struct PutFile<'a> {
    /// New file content
    pub content: &'a str,
    /// Hash the file must currently have; `None` means it must not exist
    pub expected_hash: Option<&'a str>,
    /// Commit message
    pub message: &'a str,
}

/// Operations the relay needs from a hosted repository.
///
/// Writes and deletes are conditioned on the file's current hash; a
/// mismatch fails with [`crate::SyncError::Conflict`].
#[async_trait]
pub trait RepositoryRemote: Send + Sync {
    /// Repository metadata, `None` when it does not exist.
    async fn repository(&self, repo: &str) -> SyncResult<Option<RepoInfo>>;

    /// Create a public, auto-initialized repository.
    async fn create_repository(&self, repo: &str, description: &str) -> SyncResult<RepoInfo>;

    /// Blob paths on a branch, in tree order. Empty for an empty repository.
    async fn list_tree(&self, repo: &str, branch: &str) -> SyncResult<Vec<String>>;

    /// Current file, `None` when absent.
    async fn get_file(&self, repo: &str, path: &str, branch: &str)
        -> SyncResult<Option<RemoteFile>>;

    /// Create or replace a file. Returns the new content hash.
    async fn put_file(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
        request: PutFile<'_>,
    ) -> SyncResult<String>;

    /// Delete a file whose current hash is `expected_hash`.
    async fn delete_file(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
        expected_hash: &str,
        message: &str,
    ) -> SyncResult<()>;
}
