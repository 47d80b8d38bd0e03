//! Error types for repository access.

use std::time::Duration;

use common::Transient;
use thiserror::Error;

/// Result alias for repository operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors returned by a [`crate::RepositoryRemote`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request failed before a response arrived
    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status not covered by a more specific variant
    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Primary or secondary rate limit hit
    #[error("GitHub rate limit exceeded, retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// The file changed between read and write
    #[error("{path} was modified concurrently (content hash mismatch)")]
    Conflict { path: String },

    /// Repository, branch or file does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Path exists but is a directory or submodule
    #[error("{path} is not a regular file")]
    NotAFile { path: String },

    /// Response body could not be decoded
    #[error("invalid GitHub response: {0}")]
    Decode(String),

    /// The configured API URL cannot address repository paths
    #[error("invalid GitHub API URL: {0}")]
    InvalidUrl(String),
}

impl SyncError {
    /// Whether this is an optimistic-concurrency failure.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl Transient for SyncError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status >= 500,
            Self::RateLimited { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
