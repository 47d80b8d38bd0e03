//! Applies file operations to a remote branch.

use std::sync::Arc;

use common::{FileOperation, OperationKind, OperationOutcome, RetryPolicy, RunReport, Transient};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::hash::git_blob_sha;
use crate::remote::{PutFile, RepositoryRemote};

/// Commit message for one operation.
pub fn commit_message(op: &FileOperation, card_title: &str) -> String {
    format!("relay: {} {} ({})", op.kind.as_str(), op.path, card_title)
}

/// Sequential, per-operation-isolated writer.
///
/// Operations are applied in the order given. Each one reads the current
/// content hash and conditions its write on it, so a concurrent change
/// surfaces as a per-operation conflict rather than a lost update.
pub struct SyncEngine {
    remote: Arc<dyn RepositoryRemote>,
    retry: RetryPolicy,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn RepositoryRemote>, retry: RetryPolicy) -> Self {
        Self { remote, retry }
    }

    /// Apply every operation and collect the outcomes.
    ///
    /// Never fails as a whole: each operation's error is recorded in the
    /// report and the next operation is attempted.
    pub async fn apply(
        &self,
        repo: &str,
        branch: &str,
        operations: &[FileOperation],
        card_title: &str,
    ) -> RunReport {
        let mut report = RunReport::start();

        for op in operations {
            let outcome = match self.apply_one(repo, branch, op, card_title).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(repo = %repo, path = %op.path, action = op.kind.as_str(), "Operation failed: {}", e);
                    OperationOutcome::failed(op, e.to_string())
                }
            };
            report.record(outcome);
        }

        report.finish();
        info!(
            repo = %repo,
            branch = %branch,
            succeeded = report.succeeded_count(),
            no_op = report.no_op_count(),
            failed = report.failed_count(),
            "Applied operations"
        );
        report
    }

    async fn apply_one(
        &self,
        repo: &str,
        branch: &str,
        op: &FileOperation,
        card_title: &str,
    ) -> SyncResult<OperationOutcome> {
        let remote = &self.remote;
        let path = op.path.as_str();
        let message = commit_message(op, card_title);

        let current = self
            .retry
            .run("read file", || remote.get_file(repo, path, branch))
            .await?
            .map(|file| file.content_hash);

        match op.kind {
            OperationKind::Delete => {
                let Some(hash) = current else {
                    debug!(path = %path, "Delete of absent file");
                    return Ok(OperationOutcome::no_op(op, "already absent"));
                };
                let deleted = self
                    .retry
                    .run("delete file", || {
                        remote.delete_file(repo, path, branch, &hash, &message)
                    })
                    .await;
                match deleted {
                    Ok(()) => Ok(OperationOutcome::applied(op, None)),
                    // removed by someone else between read and delete
                    Err(SyncError::NotFound(_)) => {
                        Ok(OperationOutcome::no_op(op, "already absent"))
                    }
                    Err(e) => Err(e),
                }
            }
            OperationKind::Create | OperationKind::Update => {
                let content = op.content_str();
                if current.as_deref() == Some(git_blob_sha(content.as_bytes()).as_str()) {
                    debug!(path = %path, "Content unchanged");
                    return Ok(OperationOutcome::no_op(op, "content unchanged"));
                }
                let hash = self
                    .write(repo, branch, path, content, current.as_deref(), &message)
                    .await?;
                debug!(path = %path, hash = %hash, "Wrote file");
                Ok(OperationOutcome::applied(op, Some(hash)))
            }
        }
    }

    /// Conditional write with retry.
    ///
    /// A transient failure does not prove the write was lost, so before each
    /// retry the file is read again: if it already holds `content` the write
    /// landed; if it changed to anything else the write conflicts.
    async fn write(
        &self,
        repo: &str,
        branch: &str,
        path: &str,
        content: &str,
        expected_hash: Option<&str>,
        message: &str,
    ) -> SyncResult<String> {
        let remote = &self.remote;
        let target = git_blob_sha(content.as_bytes());
        let max_attempts = self.retry.max_attempts.max(1);
        let request = PutFile {
            content,
            expected_hash,
            message,
        };

        let mut attempt = 1;
        loop {
            let error = match remote.put_file(repo, path, branch, request).await {
                Ok(hash) => return Ok(hash),
                Err(e) if e.is_transient() && attempt < max_attempts => e,
                Err(e) => return Err(e),
            };
            let delay = error
                .retry_after()
                .map_or_else(|| self.retry.backoff(attempt), |d| d.min(self.retry.max_delay));
            warn!(
                "write file failed with transient error, retrying in {}ms (attempt {}/{}): {}",
                delay.as_millis(),
                attempt,
                max_attempts,
                error
            );
            sleep(delay).await;
            attempt += 1;

            let now = self
                .retry
                .run("read file", || remote.get_file(repo, path, branch))
                .await?
                .map(|file| file.content_hash);
            if now.as_deref() == Some(target.as_str()) {
                debug!(path = %path, "Write landed despite the failed response");
                return Ok(target);
            }
            if now.as_deref() != expected_hash {
                return Err(SyncError::Conflict {
                    path: path.to_string(),
                });
            }
        }
    }
}
