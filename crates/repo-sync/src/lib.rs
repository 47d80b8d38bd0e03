//! Repository access and synchronization for the card relay.
//!
//! This crate provides:
//! - The [`RepositoryRemote`] interface with a GitHub REST implementation
//!   and an in-memory one
//! - [`SnapshotBuilder`], which bootstraps a repository and captures the
//!   context shown to the model
//! - [`SyncEngine`], which applies file operations with hash-conditioned
//!   writes and per-operation failure isolation

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::uninlined_format_args)]

pub mod engine;
pub mod error;
pub mod github;
pub mod hash;
pub mod memory;
pub mod remote;
pub mod snapshot;

pub use engine::{commit_message, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use github::{GitHubClient, GITHUB_API_URL};
pub use hash::git_blob_sha;
pub use memory::{CommitRecord, InMemoryRemote};
pub use remote::{PutFile, RemoteFile, RepoInfo, RepositoryRemote, FALLBACK_BRANCH};
pub use snapshot::{PreparedRepository, SnapshotBuilder, SnapshotOptions, KEY_FILE_CANDIDATES};
