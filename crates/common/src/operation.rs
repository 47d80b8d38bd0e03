//! File operations produced by code generation and applied to a repository.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of change a [`FileOperation`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Create a new file (upserts if it already exists)
    Create,
    /// Replace the content of a file (creates it if absent)
    Update,
    /// Remove a file
    Delete,
}

impl OperationKind {
    /// All kinds, in wire order.
    pub const ALL: [Self; 3] = [Self::Create, Self::Update, Self::Delete];

    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Whether operations of this kind carry content.
    #[must_use]
    pub const fn requires_content(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    /// Parse a wire action. Only the exact lowercase names are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unrecognized action '{s}'"))
    }
}

/// Reasons a path is rejected during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path '{0}' escapes the repository root")]
    Escapes(String),

    #[error("path '{0}' is absolute")]
    Absolute(String),

    #[error("path '{0}' contains invalid characters")]
    InvalidCharacters(String),
}

/// Normalize a repository-relative path.
///
/// Leading slashes and `./` segments are stripped, backslashes become forward
/// slashes and empty segments collapse. Paths containing a `..` segment, a
/// drive prefix, or control characters are rejected.
pub fn normalize_path(raw: &str) -> Result<String, PathError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PathError::Empty);
    }
    if trimmed.chars().any(char::is_control) {
        return Err(PathError::InvalidCharacters(trimmed.to_string()));
    }

    let unified = trimmed.replace('\\', "/");
    if let [drive, b':', ..] = unified.as_bytes() {
        if drive.is_ascii_alphabetic() {
            return Err(PathError::Absolute(trimmed.to_string()));
        }
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(PathError::Escapes(trimmed.to_string())),
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(segments.join("/"))
}

/// The unit of change applied to a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOperation {
    /// Normalized repository-relative path
    pub path: String,
    /// What to do with the path
    #[serde(rename = "action")]
    pub kind: OperationKind,
    /// Literal file content; always `Some` for create/update, `None` for delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FileOperation {
    /// Build a validated operation.
    ///
    /// Content is dropped for deletes and required for creates/updates.
    pub fn new(
        path: &str,
        kind: OperationKind,
        content: Option<String>,
    ) -> Result<Self, OperationError> {
        let path = normalize_path(path)?;
        let content = if kind.requires_content() {
            Some(content.ok_or(OperationError::MissingContent { kind })?)
        } else {
            None
        };
        Ok(Self {
            path,
            kind,
            content,
        })
    }

    /// Shorthand for a create operation.
    pub fn create(path: &str, content: impl Into<String>) -> Result<Self, OperationError> {
        Self::new(path, OperationKind::Create, Some(content.into()))
    }

    /// Shorthand for an update operation.
    pub fn update(path: &str, content: impl Into<String>) -> Result<Self, OperationError> {
        Self::new(path, OperationKind::Update, Some(content.into()))
    }

    /// Shorthand for a delete operation.
    pub fn delete(path: &str) -> Result<Self, OperationError> {
        Self::new(path, OperationKind::Delete, None)
    }

    /// Content as a string slice (empty for deletes).
    #[must_use]
    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// Reasons a candidate operation fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("{kind} operation has no content")]
    MissingContent { kind: OperationKind },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_is_exact() {
        assert_eq!("create".parse::<OperationKind>(), Ok(OperationKind::Create));
        assert_eq!("update".parse::<OperationKind>(), Ok(OperationKind::Update));
        assert_eq!("delete".parse::<OperationKind>(), Ok(OperationKind::Delete));
        assert!("UPDATE".parse::<OperationKind>().is_err());
        assert!(" delete ".parse::<OperationKind>().is_err());
        assert!("Create".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_kind_parse_rejects_unknown_actions() {
        assert!("archive".parse::<OperationKind>().is_err());
        assert!("".parse::<OperationKind>().is_err());
        assert!("modify".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_normalize_strips_leading_slashes_and_dots() {
        assert_eq!(normalize_path("/src/main.ts").unwrap(), "src/main.ts");
        assert_eq!(normalize_path("./README.md").unwrap(), "README.md");
        assert_eq!(normalize_path("//a//b/./c.txt").unwrap(), "a/b/c.txt");
        assert_eq!(normalize_path("src\\lib\\mod.rs").unwrap(), "src/lib/mod.rs");
    }

    #[test]
    fn test_normalize_rejects_escape_and_empty() {
        assert_eq!(normalize_path(""), Err(PathError::Empty));
        assert_eq!(normalize_path("  / "), Err(PathError::Empty));
        assert!(matches!(
            normalize_path("../secrets.txt"),
            Err(PathError::Escapes(_))
        ));
        assert!(matches!(
            normalize_path("src/../../x"),
            Err(PathError::Escapes(_))
        ));
        assert!(matches!(
            normalize_path("C:\\Windows\\x"),
            Err(PathError::Absolute(_))
        ));
        assert!(matches!(
            normalize_path("a\nb"),
            Err(PathError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn test_delete_drops_content() {
        let op = FileOperation::new("x.txt", OperationKind::Delete, Some("ignored".into())).unwrap();
        assert_eq!(op.content, None);
        assert_eq!(op.content_str(), "");
    }

    #[test]
    fn test_create_requires_content() {
        let err = FileOperation::new("x.txt", OperationKind::Create, None).unwrap_err();
        assert_eq!(
            err,
            OperationError::MissingContent {
                kind: OperationKind::Create
            }
        );
    }

    #[test]
    fn test_serializes_with_wire_field_names() {
        let op = FileOperation::create("README.md", "# Hi").unwrap();
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"path": "README.md", "action": "create", "content": "# Hi"})
        );
    }
}
