//! Repository context capture for prompt building.

use std::sync::Arc;

use common::{truncate_chars, KeyFile, RepositorySnapshot, RetryPolicy};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::remote::{RepoInfo, RepositoryRemote};

/// Files worth showing the model verbatim, in the order they are included.
pub const KEY_FILE_CANDIDATES: &[&str] = &[
    "README.md",
    "package.json",
    "vite.config.ts",
    "vite.config.js",
    "tsconfig.json",
    "index.html",
    "build.hxml",
    "src/main.ts",
    "src/Main.hx",
    "src/index.ts",
    "Cargo.toml",
];

/// Bounds applied to a captured snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotOptions {
    pub max_files: usize,
    pub max_key_files: usize,
    pub key_file_chars: usize,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            max_files: 100,
            max_key_files: 8,
            key_file_chars: 4000,
        }
    }
}

/// A repository that is known to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRepository {
    pub info: RepoInfo,
    /// Created by this run
    pub created: bool,
}

impl PreparedRepository {
    /// Branch the run writes to.
    pub fn branch(&self) -> &str {
        self.info.branch()
    }
}

/// Builds a fresh [`RepositorySnapshot`] for every run.
pub struct SnapshotBuilder {
    remote: Arc<dyn RepositoryRemote>,
    retry: RetryPolicy,
    options: SnapshotOptions,
}

impl SnapshotBuilder {
    pub fn new(remote: Arc<dyn RepositoryRemote>, retry: RetryPolicy) -> Self {
        Self {
            remote,
            retry,
            options: SnapshotOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: SnapshotOptions) -> Self {
        self.options = options;
        self
    }

    /// Look up `repo`, creating it when it does not exist.
    pub async fn ensure_repository(
        &self,
        repo: &str,
        description: &str,
    ) -> SyncResult<PreparedRepository> {
        let remote = &self.remote;
        let existing = self
            .retry
            .run("fetch repository", || remote.repository(repo))
            .await?;

        if let Some(info) = existing {
            debug!(repo = %repo, branch = %info.branch(), "Repository exists");
            return Ok(PreparedRepository {
                info,
                created: false,
            });
        }

        info!(repo = %repo, "Creating repository");
        let info = self
            .retry
            .run("create repository", || {
                remote.create_repository(repo, description)
            })
            .await?;
        Ok(PreparedRepository {
            info,
            created: true,
        })
    }

    /// Capture the file list and key files of a prepared repository.
    ///
    /// Transport failures are returned; a key file that is missing, binary
    /// or not a regular file is skipped.
    pub async fn capture(&self, repo: &PreparedRepository) -> SyncResult<RepositorySnapshot> {
        let name = repo.info.name.as_str();
        let branch = repo.branch();

        if repo.created {
            return Ok(RepositorySnapshot::new_project(branch));
        }

        let remote = &self.remote;
        let mut paths = self
            .retry
            .run("list tree", || remote.list_tree(name, branch))
            .await?;

        if paths.is_empty() {
            debug!(repo = %name, "Repository is empty, using new-project framing");
            return Ok(RepositorySnapshot::new_project(branch));
        }

        let key_files = self.key_files(name, branch, &paths).await?;

        let truncated = paths.len() > self.options.max_files;
        paths.truncate(self.options.max_files);

        info!(
            repo = %name,
            files = paths.len(),
            truncated,
            key_files = key_files.len(),
            "Captured repository snapshot"
        );
        Ok(RepositorySnapshot::existing(
            branch, paths, truncated, key_files,
        ))
    }

    async fn key_files(
        &self,
        name: &str,
        branch: &str,
        paths: &[String],
    ) -> SyncResult<Vec<KeyFile>> {
        let remote = &self.remote;
        let mut key_files = Vec::new();

        for candidate in KEY_FILE_CANDIDATES {
            if key_files.len() >= self.options.max_key_files {
                break;
            }
            if !paths.iter().any(|p| p == candidate) {
                continue;
            }

            let fetched = self
                .retry
                .run("fetch key file", || remote.get_file(name, candidate, branch))
                .await;

            let text = match fetched {
                Ok(Some(file)) => file.text,
                Ok(None) => None,
                Err(SyncError::NotAFile { .. }) => None,
                Err(e) => return Err(e),
            };
            let Some(text) = text else {
                warn!(path = %candidate, "Skipping key file that is absent or not text");
                continue;
            };

            let truncated = text.chars().count() > self.options.key_file_chars;
            let content = if truncated {
                truncate_chars(&text, self.options.key_file_chars)
            } else {
                text
            };
            key_files.push(KeyFile {
                path: (*candidate).to_string(),
                content,
                truncated,
            });
        }

        Ok(key_files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRemote;

    fn builder(remote: InMemoryRemote) -> (Arc<InMemoryRemote>, SnapshotBuilder) {
        let remote = Arc::new(remote);
        let builder = SnapshotBuilder::new(remote.clone(), RetryPolicy::none());
        (remote, builder)
    }

    #[tokio::test]
    async fn test_missing_repository_is_created_as_new_project() {
        let (remote, builder) = builder(InMemoryRemote::new("acme"));

        let prepared = builder.ensure_repository("space-game", "desc").await.unwrap();
        assert!(prepared.created);
        assert!(remote.has_repository("space-game"));

        let snapshot = builder.capture(&prepared).await.unwrap();
        assert!(snapshot.is_new);
        assert_eq!(snapshot.branch, "main");
        assert!(snapshot.file_list.is_empty());
    }

    #[tokio::test]
    async fn test_existing_repository_lists_files_and_key_files() {
        let remote = InMemoryRemote::new("acme")
            .with_repository("web", "trunk")
            .with_file("web", "trunk", "README.md", "# Web\n")
            .with_file("web", "trunk", "package.json", "{\"name\":\"web\"}")
            .with_file("web", "trunk", "src/app.ts", "export {}");
        let (_, builder) = builder(remote);

        let prepared = builder.ensure_repository("web", "desc").await.unwrap();
        assert!(!prepared.created);
        let snapshot = builder.capture(&prepared).await.unwrap();

        assert!(!snapshot.is_new);
        assert_eq!(snapshot.branch, "trunk");
        assert!(snapshot.contains("src/app.ts"));
        let keys: Vec<_> = snapshot.key_files.iter().map(|k| k.path.as_str()).collect();
        assert_eq!(keys, vec!["README.md", "package.json"]);
    }

    #[tokio::test]
    async fn test_bounds_are_applied() {
        let mut remote = InMemoryRemote::new("acme")
            .with_repository("big", "main")
            .with_file("big", "main", "README.md", &"x".repeat(50));
        for i in 0..10 {
            remote = remote.with_file("big", "main", &format!("f{i:02}.txt"), "x");
        }
        let (_, builder) = builder(remote);
        let builder = builder.with_options(SnapshotOptions {
            max_files: 4,
            max_key_files: 8,
            key_file_chars: 10,
        });

        let prepared = builder.ensure_repository("big", "").await.unwrap();
        let snapshot = builder.capture(&prepared).await.unwrap();

        assert_eq!(snapshot.file_list.len(), 4);
        assert!(snapshot.file_list_truncated);
        assert!(snapshot.key_files[0].truncated);
        assert_eq!(snapshot.key_files[0].content.chars().count(), 11);
    }

    #[tokio::test]
    async fn test_empty_existing_repository_uses_new_project_framing() {
        let (_, builder) = builder(InMemoryRemote::new("acme").with_repository("empty", "main"));
        let prepared = builder.ensure_repository("empty", "").await.unwrap();
        assert!(builder.capture(&prepared).await.unwrap().is_new);
    }
}
