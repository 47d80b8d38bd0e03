//! Outcome comments posted back to the card.

use std::fmt::Write as _;

use codegen::Recovered;
use common::{truncate_chars, RunReport};

use crate::pipeline::ErrorKind;

/// Bound on the diagnostic included in a failure comment.
pub const FAILURE_MESSAGE_CHARS: usize = 300;

/// Success comment summarizing a run.
#[must_use]
pub fn success(project_type: &str, repo_url: &str, report: &RunReport, recovered: &Recovered) -> String {
    let applied = report.succeeded_count() - report.no_op_count();
    let mut text = format!("Done ({project_type})\n{repo_url}\n");
    let _ = write!(
        text,
        "Applied: {applied}, unchanged: {}, failed: {}",
        report.no_op_count(),
        report.failed_count()
    );

    let failed = report.failed_paths();
    if !failed.is_empty() {
        let _ = write!(text, "\nFailed paths: {}", failed.join(", "));
    }
    if recovered.is_truncated() {
        text.push_str("\nNote: the model output was cut off; trailing operations may be missing.");
    }
    if recovered.is_degraded() {
        text.push_str(
            "\nNote: the model output was malformed and only partially recovered; review the commits.",
        );
    }
    if !recovered.dropped.is_empty() {
        let _ = write!(
            text,
            "\nSkipped {} invalid operation(s).",
            recovered.dropped.len()
        );
    }
    text
}

/// Failure comment with a bounded diagnostic.
#[must_use]
pub fn failure(kind: ErrorKind, message: &str) -> String {
    format!(
        "Generation failed ({}): {}",
        kind.as_str(),
        truncate_chars(message, FAILURE_MESSAGE_CHARS)
    )
}
