//! In-memory [`RepositoryRemote`] for tests and dry runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{SyncError, SyncResult};
use crate::hash::git_blob_sha;
use crate::remote::{PutFile, RemoteFile, RepoInfo, RepositoryRemote, FALLBACK_BRANCH};

/// A write recorded by [`InMemoryRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub repo: String,
    pub path: String,
    pub message: String,
    pub deleted: bool,
}

#[derive(Debug, Default)]
struct RepoState {
    info: Option<RepoInfo>,
    branches: HashMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Default)]
struct State {
    repos: HashMap<String, RepoState>,
    commits: Vec<CommitRecord>,
    conflicts: HashSet<String>,
    lost_responses: HashSet<String>,
    transient_failures: u32,
    calls: u32,
}

/// Repository host kept entirely in memory.
///
/// Writes obey the same hash conditions as GitHub: replacing or deleting an
/// existing file requires its current hash.
#[derive(Debug)]
pub struct InMemoryRemote {
    owner: String,
    state: Mutex<State>,
}

impl InMemoryRemote {
    /// Empty host for `owner`.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn info_for(&self, repo: &str, branch: &str) -> RepoInfo {
        RepoInfo {
            name: repo.to_string(),
            default_branch: Some(branch.to_string()),
            html_url: format!("https://github.com/{}/{}", self.owner, repo),
        }
    }

    /// Add an (empty) repository with the given default branch.
    #[must_use]
    pub fn with_repository(self, repo: &str, branch: &str) -> Self {
        let info = self.info_for(repo, branch);
        self.state().repos.entry(repo.to_string()).or_default().info = Some(info);
        self
    }

    /// Store a file without recording a commit.
    #[must_use]
    pub fn with_file(self, repo: &str, branch: &str, path: &str, content: &str) -> Self {
        self.state()
            .repos
            .entry(repo.to_string())
            .or_default()
            .branches
            .entry(branch.to_string())
            .or_default()
            .insert(path.to_string(), content.to_string());
        self
    }

    /// Make the next write or delete of `path` fail with a conflict.
    pub fn inject_conflict(&self, path: &str) {
        self.state().conflicts.insert(path.to_string());
    }

    /// Make the next write of `path` land but report a transient 503, as
    /// when a response is lost after the host committed.
    pub fn lose_write_response(&self, path: &str) {
        self.state().lost_responses.insert(path.to_string());
    }

    /// Make the next `count` calls fail with a transient 503.
    pub fn fail_transiently(&self, count: u32) {
        self.state().transient_failures = count;
    }

    /// Current content of a file.
    pub fn file(&self, repo: &str, branch: &str, path: &str) -> Option<String> {
        self.state()
            .repos
            .get(repo)
            .and_then(|r| r.branches.get(branch))
            .and_then(|files| files.get(path))
            .cloned()
    }

    /// Whether a repository exists.
    pub fn has_repository(&self, repo: &str) -> bool {
        self.state()
            .repos
            .get(repo)
            .is_some_and(|r| r.info.is_some())
    }

    /// Writes performed so far, in order.
    pub fn commits(&self) -> Vec<CommitRecord> {
        self.state().commits.clone()
    }

    /// Total remote calls received, including failed ones.
    pub fn calls(&self) -> u32 {
        self.state().calls
    }

    /// Count the call and fail it if a transient failure is pending.
    fn enter(&self) -> SyncResult<MutexGuard<'_, State>> {
        let mut state = self.state();
        state.calls += 1;
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(SyncError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(state)
    }
}

fn files_mut<'a>(
    state: &'a mut State,
    repo: &str,
    branch: &str,
) -> SyncResult<&'a mut BTreeMap<String, String>> {
    let repo_state = state
        .repos
        .get_mut(repo)
        .filter(|r| r.info.is_some())
        .ok_or_else(|| SyncError::NotFound(repo.to_string()))?;
    Ok(repo_state.branches.entry(branch.to_string()).or_default())
}

#[async_trait]
impl RepositoryRemote for InMemoryRemote {
    async fn repository(&self, repo: &str) -> SyncResult<Option<RepoInfo>> {
        let state = self.enter()?;
        Ok(state.repos.get(repo).and_then(|r| r.info.clone()))
    }

    async fn create_repository(&self, repo: &str, _description: &str) -> SyncResult<RepoInfo> {
        let info = self.info_for(repo, FALLBACK_BRANCH);
        let mut state = self.enter()?;
        let repo_state = state.repos.entry(repo.to_string()).or_default();
        if let Some(existing) = &repo_state.info {
            return Ok(existing.clone());
        }
        repo_state.info = Some(info.clone());
        // auto_init creates an initial README
        repo_state
            .branches
            .entry(FALLBACK_BRANCH.to_string())
            .or_default()
            .insert("README.md".to_string(), format!("# {repo}\n"));
        Ok(info)
    }

    async fn list_tree(&self, repo: &str, branch: &str) -> SyncResult<Vec<String>> {
        let mut state = self.enter()?;
        Ok(files_mut(&mut state, repo, branch)?.keys().cloned().collect())
    }

    async fn get_file(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> SyncResult<Option<RemoteFile>> {
        let mut state = self.enter()?;
        Ok(files_mut(&mut state, repo, branch)?
            .get(path)
            .map(|content| RemoteFile {
                content_hash: git_blob_sha(content.as_bytes()),
                text: Some(content.clone()),
            }))
    }

    async fn put_file(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
        request: PutFile<'_>,
    ) -> SyncResult<String> {
        let mut state = self.enter()?;
        if state.conflicts.remove(path) {
            return Err(SyncError::Conflict {
                path: path.to_string(),
            });
        }

        let files = files_mut(&mut state, repo, branch)?;
        let current = files.get(path).map(|c| git_blob_sha(c.as_bytes()));
        if current.as_deref() != request.expected_hash {
            return Err(SyncError::Conflict {
                path: path.to_string(),
            });
        }
        files.insert(path.to_string(), request.content.to_string());

        state.commits.push(CommitRecord {
            repo: repo.to_string(),
            path: path.to_string(),
            message: request.message.to_string(),
            deleted: false,
        });
        if state.lost_responses.remove(path) {
            return Err(SyncError::Api {
                status: 503,
                message: "response lost".to_string(),
            });
        }
        Ok(git_blob_sha(request.content.as_bytes()))
    }

    async fn delete_file(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
        expected_hash: &str,
        message: &str,
    ) -> SyncResult<()> {
        let mut state = self.enter()?;
        if state.conflicts.remove(path) {
            return Err(SyncError::Conflict {
                path: path.to_string(),
            });
        }

        let files = files_mut(&mut state, repo, branch)?;
        let Some(current) = files.get(path) else {
            return Err(SyncError::NotFound(path.to_string()));
        };
        if git_blob_sha(current.as_bytes()) != expected_hash {
            return Err(SyncError::Conflict {
                path: path.to_string(),
            });
        }
        files.remove(path);

        state.commits.push(CommitRecord {
            repo: repo.to_string(),
            path: path.to_string(),
            message: message.to_string(),
            deleted: true,
        });
        Ok(())
    }
}
