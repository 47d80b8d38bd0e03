//! Shared types for the card relay.
//!
//! This crate provides:
//! - The [`FileOperation`] unit of change and path normalization
//! - The read-only [`RepositorySnapshot`] used to ground prompts
//! - Per-operation outcomes aggregated into a [`RunReport`]
//! - A bounded, backoff-based [`RetryPolicy`] shared by every remote caller

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

pub mod operation;
pub mod report;
pub mod retry;
pub mod snapshot;

pub use operation::{normalize_path, FileOperation, OperationError, OperationKind, PathError};
pub use report::{OperationOutcome, OutcomeStatus, RunReport};
pub use retry::{RetryPolicy, Transient};
pub use snapshot::{KeyFile, RepositorySnapshot};

/// Truncate text to at most `max` characters, appending an ellipsis when cut.
///
/// Used for diagnostics that must stay bounded (error previews, comments).
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}
