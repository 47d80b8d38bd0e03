//! Response recovery: raw provider text to validated file operations.
//!
//! Strategies run in a fixed order and stop at the first success:
//!
//! 1. strip code fences and isolate the operations array
//! 2. direct parse
//! 3. escape literal control characters inside string literals, reparse
//! 4. truncation recovery: cut back to the last complete element and close
//!    the array (only when the parser ran out of input)
//! 5. manual extraction of individual `{"path": ...}` objects (degraded)
//!
//! When nothing works the response is rejected. Raw text is never used as
//! file content.

mod escape;
mod extract;
mod scan;

use std::fmt;

use common::{FileOperation, OperationKind};
use serde::Serialize;
use serde_json::error::Category;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{CodegenError, CodegenResult};

/// Characters of raw text kept in an unrecoverable-response error.
pub const PREVIEW_CHARS: usize = 500;

/// Upper bound on truncation cut points tried.
const MAX_TRUNCATION_ATTEMPTS: usize = 32;

/// Strategy that produced the operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Direct,
    ControlCharRepair,
    TruncationRecovery,
    ManualExtraction,
}

impl RecoveryStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::ControlCharRepair => "control_char_repair",
            Self::TruncationRecovery => "truncation_recovery",
            Self::ManualExtraction => "manual_extraction",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate object rejected by validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedCandidate {
    /// Position of the candidate in the parsed sequence
    pub index: usize,
    /// Why it was rejected
    pub reason: String,
}

/// Operations recovered from one response.
#[derive(Debug, Clone, Serialize)]
pub struct Recovered {
    /// Validated operations, in response order
    pub operations: Vec<FileOperation>,
    /// Strategy that succeeded
    pub strategy: RecoveryStrategy,
    /// Candidates dropped by validation
    pub dropped: Vec<DroppedCandidate>,
    /// Incomplete objects skipped (truncated tail or unreadable objects)
    pub skipped_objects: usize,
}

impl Recovered {
    /// Recovered through manual extraction: partial, not equivalent to a
    /// clean parse.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.strategy == RecoveryStrategy::ManualExtraction
    }

    /// Recovered by discarding an incomplete tail.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.strategy == RecoveryStrategy::TruncationRecovery
    }
}

/// Recover a validated operation sequence from raw provider output.
pub fn recover(raw: &str) -> CodegenResult<Recovered> {
    let stripped = scan::strip_fences(raw);

    if let Some(array) = scan::isolate_array(stripped) {
        let mut last_error = match parse_array(array) {
            Ok(items) => return finish(items, RecoveryStrategy::Direct, 0),
            Err(e) => {
                debug!("Direct parse failed: {}", e);
                e
            }
        };

        let repaired = scan::escape_control_chars(array);
        if let Some(repaired) = &repaired {
            match parse_array(repaired) {
                Ok(items) => return finish(items, RecoveryStrategy::ControlCharRepair, 0),
                Err(e) => {
                    debug!("Parse after control-character repair failed: {}", e);
                    last_error = e;
                }
            }
        }

        let candidate = repaired.as_deref().unwrap_or(array);
        if last_error.classify() == Category::Eof {
            if let Some(items) = recover_truncated(candidate, &last_error) {
                warn!(
                    "Response was truncated; kept {} complete objects and dropped the tail",
                    items.len()
                );
                return finish(items, RecoveryStrategy::TruncationRecovery, 1);
            }
        }
    }

    let extraction = extract::extract_objects(stripped);
    if !extraction.objects.is_empty() {
        warn!(
            "Degraded recovery: extracted {} objects manually, skipped {}",
            extraction.objects.len(),
            extraction.skipped
        );
        return finish(
            extraction.objects,
            RecoveryStrategy::ManualExtraction,
            extraction.skipped,
        );
    }

    Err(CodegenError::Unrecoverable {
        preview: common::truncate_chars(raw, PREVIEW_CHARS),
    })
}

fn parse_array(text: &str) -> Result<Vec<Value>, serde_json::Error> {
    serde_json::from_str::<Vec<Value>>(text)
}

/// Cut the array back to complete elements, newest cut point first.
fn recover_truncated(text: &str, error: &serde_json::Error) -> Option<Vec<Value>> {
    let limit = scan::byte_offset(text, error.line(), error.column());
    let boundaries = scan::element_boundaries(text, limit);

    boundaries
        .iter()
        .rev()
        .take(MAX_TRUNCATION_ATTEMPTS)
        .find_map(|&cut| {
            let closed = format!("{}]", &text[..cut]);
            parse_array(&closed).ok().filter(|items| !items.is_empty())
        })
}

fn finish(
    items: Vec<Value>,
    strategy: RecoveryStrategy,
    skipped_objects: usize,
) -> CodegenResult<Recovered> {
    let candidates = items.len();
    let (operations, dropped) = validate(items);

    if operations.is_empty() {
        let reason = if candidates == 0 {
            "array has no elements".to_string()
        } else {
            format!("all {candidates} candidates failed validation")
        };
        return Err(CodegenError::EmptyResult { reason });
    }

    info!(
        strategy = %strategy,
        operations = operations.len(),
        dropped = dropped.len(),
        "Recovered file operations"
    );
    Ok(Recovered {
        operations,
        strategy,
        dropped,
        skipped_objects,
    })
}

/// Validate candidates, keeping order and dropping invalid ones.
fn validate(items: Vec<Value>) -> (Vec<FileOperation>, Vec<DroppedCandidate>) {
    let mut operations = Vec::with_capacity(items.len());
    let mut dropped = Vec::new();

    for (index, item) in items.into_iter().enumerate() {
        match to_operation(item) {
            Ok(op) => operations.push(op),
            Err(reason) => {
                warn!(index, reason = %reason, "Dropping invalid operation");
                dropped.push(DroppedCandidate { index, reason });
            }
        }
    }
    (operations, dropped)
}

fn to_operation(item: Value) -> Result<FileOperation, String> {
    let Value::Object(mut object) = item else {
        return Err("not an object".to_string());
    };

    let path = match object.get("path") {
        Some(Value::String(path)) if !path.trim().is_empty() => path.clone(),
        Some(Value::String(_)) | None => return Err("missing path".to_string()),
        Some(_) => return Err("path is not a string".to_string()),
    };
    let kind = match object.get("action") {
        Some(Value::String(action)) => action.parse::<OperationKind>()?,
        Some(_) => return Err(format!("{path}: action is not a string")),
        None => return Err(format!("{path}: missing action")),
    };
    let content = match object.remove("content") {
        Some(Value::String(content)) => Some(match escape::normalize_content(&content) {
            Some(normalized) => {
                debug!(path = %path, "Unescaped double-escaped content");
                normalized
            }
            None => content,
        }),
        Some(Value::Null) | None => None,
        Some(_) if kind.requires_content() => {
            return Err(format!("{path}: content is not a string"));
        }
        Some(_) => None,
    };

    FileOperation::new(&path, kind, content).map_err(|e| format!("{path}: {e}"))
}
