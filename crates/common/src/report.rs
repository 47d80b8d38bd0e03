//! Per-operation outcomes and the aggregated run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operation::{FileOperation, OperationKind};

/// Result of applying one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// A commit was written; carries the resulting blob hash (none for deletes)
    Applied { content_hash: Option<String> },
    /// Nothing to do: delete of an absent path, or content already identical
    NoOp { reason: String },
    /// The operation could not be applied
    Failed { error: String },
}

/// Outcome of a single [`FileOperation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Path the operation targeted
    pub path: String,
    /// Kind of the operation
    pub kind: OperationKind,
    /// What happened
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl OperationOutcome {
    /// Outcome for a written commit.
    #[must_use]
    pub fn applied(op: &FileOperation, content_hash: Option<String>) -> Self {
        Self {
            path: op.path.clone(),
            kind: op.kind,
            status: OutcomeStatus::Applied { content_hash },
        }
    }

    /// Outcome for an operation that required no change.
    #[must_use]
    pub fn no_op(op: &FileOperation, reason: impl Into<String>) -> Self {
        Self {
            path: op.path.clone(),
            kind: op.kind,
            status: OutcomeStatus::NoOp {
                reason: reason.into(),
            },
        }
    }

    /// Outcome for a failed operation.
    #[must_use]
    pub fn failed(op: &FileOperation, error: impl Into<String>) -> Self {
        Self {
            path: op.path.clone(),
            kind: op.kind,
            status: OutcomeStatus::Failed {
                error: error.into(),
            },
        }
    }

    /// Whether the operation counts as succeeded (applied or no-op).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.status, OutcomeStatus::Failed { .. })
    }

    /// Whether the operation needed no change.
    #[must_use]
    pub const fn is_no_op(&self) -> bool {
        matches!(self.status, OutcomeStatus::NoOp { .. })
    }
}

/// Aggregated outcomes of one run, in application order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Operations that were applied or were no-ops
    pub succeeded: Vec<OperationOutcome>,
    /// Operations that failed
    pub failed: Vec<OperationOutcome>,
    /// When application started
    pub started_at: DateTime<Utc>,
    /// When application finished
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    /// Start an empty report.
    #[must_use]
    pub fn start() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Record an outcome in the matching bucket.
    pub fn record(&mut self, outcome: OperationOutcome) {
        if outcome.is_success() {
            self.succeeded.push(outcome);
        } else {
            self.failed.push(outcome);
        }
    }

    /// Mark the report complete.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Number of succeeded operations (including no-ops).
    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    /// Number of succeeded operations that needed no change.
    #[must_use]
    pub fn no_op_count(&self) -> usize {
        self.succeeded.iter().filter(|o| o.is_no_op()).count()
    }

    /// Number of failed operations.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Total operations recorded.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Paths of failed operations, in application order.
    #[must_use]
    pub fn failed_paths(&self) -> Vec<&str> {
        self.failed.iter().map(|o| o.path.as_str()).collect()
    }

    /// Whether every operation succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Wall-clock time spent applying, if finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_sum_to_total() {
        let a = FileOperation::create("a.txt", "a").unwrap();
        let b = FileOperation::delete("b.txt").unwrap();
        let c = FileOperation::update("c.txt", "c").unwrap();

        let mut report = RunReport::start();
        report.record(OperationOutcome::applied(&a, Some("abc".into())));
        report.record(OperationOutcome::no_op(&b, "absent"));
        report.record(OperationOutcome::failed(&c, "conflict"));
        report.finish();

        assert_eq!(report.succeeded_count(), 2);
        assert_eq!(report.no_op_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.total(), 3);
        assert_eq!(report.failed_paths(), vec!["c.txt"]);
        assert!(!report.is_clean());
        assert!(report.duration_ms().is_some());
    }

    #[test]
    fn test_outcome_serializes_flat() {
        let op = FileOperation::delete("x.txt").unwrap();
        let json = serde_json::to_value(OperationOutcome::no_op(&op, "absent")).unwrap();
        assert_eq!(json["status"], "no_op");
        assert_eq!(json["path"], "x.txt");
        assert_eq!(json["kind"], "delete");
    }
}
