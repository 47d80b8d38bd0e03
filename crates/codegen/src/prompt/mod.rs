//! Prompt template library and task prompt builder.
//!
//! A prompt is assembled in a fixed order: base instructions, project-type
//! instructions, repository context, task text, closing output contract.
//! Templates are plain text; the layout is rendered with Handlebars with
//! HTML escaping disabled so code in key files reaches the model verbatim.

use std::collections::BTreeMap;
use std::path::Path;

use common::{KeyFile, RepositorySnapshot};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{CodegenError, CodegenResult};

/// Name of the base instruction template.
pub const BASE_TEMPLATE: &str = "base-system-prompt";

/// Project type used when the requested type has no template.
pub const DEFAULT_PROJECT_TYPE: &str = "web-vite";

/// Extension of template files in a prompts directory.
pub const TEMPLATE_EXTENSION: &str = "txt";

const LAYOUT_NAME: &str = "task-prompt";

const CLOSING_CONTRACT: &str =
    "Respond ONLY with a JSON array of file operations in the format described above.";

const LAYOUT: &str = r#"{{base}}

{{specific}}

{{#if is_new}}
NEW PROJECT ({{project_type}})
The repository is empty. Create every file the project needs.
{{else}}
EXISTING PROJECT ({{project_type}}, branch {{branch}})
Use "update" for files that already exist and leave unrelated files untouched.

Files ({{file_count}}{{#if file_list_truncated}}, list truncated{{/if}}):
{{#each files}}
- {{this}}
{{/each}}
{{#each key_files}}

--- {{path}}{{#if truncated}} (truncated){{/if}} ---
{{content}}
{{/each}}
{{/if}}

TASK:
{{task}}

{{contract}}"#;

const EMBEDDED: &[(&str, &str)] = &[
    (
        BASE_TEMPLATE,
        include_str!("../../templates/base-system-prompt.txt"),
    ),
    ("web-vite", include_str!("../../templates/web-vite.txt")),
    ("haxe-heaps", include_str!("../../templates/haxe-heaps.txt")),
    (
        "backend-node",
        include_str!("../../templates/backend-node.txt"),
    ),
];

/// Values fed to the layout template.
#[derive(Debug, Serialize)]
struct PromptContext<'a> {
    base: &'a str,
    specific: &'a str,
    project_type: &'a str,
    is_new: bool,
    branch: &'a str,
    file_count: usize,
    file_list_truncated: bool,
    files: &'a [String],
    key_files: &'a [KeyFile],
    task: &'a str,
    contract: &'a str,
}

/// Loaded prompt templates, static for the lifetime of the process.
pub struct PromptLibrary {
    handlebars: Handlebars<'static>,
    base: String,
    types: BTreeMap<String, String>,
}

impl std::fmt::Debug for PromptLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptLibrary")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl PromptLibrary {
    /// Library built from the templates compiled into the binary.
    pub fn embedded() -> CodegenResult<Self> {
        let mut base = None;
        let mut types = BTreeMap::new();
        for (name, content) in EMBEDDED {
            if *name == BASE_TEMPLATE {
                base = Some(content.trim().to_string());
            } else {
                types.insert((*name).to_string(), content.trim().to_string());
            }
        }
        let base = base.ok_or_else(|| CodegenError::MissingBaseTemplate {
            path: format!("<embedded>/{BASE_TEMPLATE}.{TEMPLATE_EXTENSION}").into(),
        })?;
        Self::with_templates(base, types)
    }

    /// Library loaded from `<dir>/*.txt`. The base template must exist;
    /// every other file becomes a project-type template named by its stem.
    pub fn from_dir(dir: &Path) -> CodegenResult<Self> {
        let base_path = dir.join(format!("{BASE_TEMPLATE}.{TEMPLATE_EXTENSION}"));
        let base = match std::fs::read_to_string(&base_path) {
            Ok(content) => content.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CodegenError::MissingBaseTemplate { path: base_path });
            }
            Err(e) => return Err(e.into()),
        };

        let mut types = BTreeMap::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem == BASE_TEMPLATE {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            types.insert(stem.to_string(), content.trim().to_string());
        }

        debug!(
            "Loaded {} project-type templates from {}",
            types.len(),
            dir.display()
        );
        Self::with_templates(base, types)
    }

    /// Directory templates when `dir` is given, embedded ones otherwise.
    pub fn load(dir: Option<&Path>) -> CodegenResult<Self> {
        match dir {
            Some(dir) => Self::from_dir(dir),
            None => Self::embedded(),
        }
    }

    fn with_templates(base: String, types: BTreeMap<String, String>) -> CodegenResult<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_template_string(LAYOUT_NAME, LAYOUT)?;
        Ok(Self {
            handlebars,
            base,
            types,
        })
    }

    /// Known project types, sorted.
    pub fn project_types(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    /// Whether a project type has its own template.
    pub fn has_project_type(&self, project_type: &str) -> bool {
        self.types.contains_key(project_type)
    }

    /// Instructions for a project type, falling back to the default type.
    pub fn project_template(&self, project_type: &str) -> &str {
        if let Some(specific) = self.types.get(project_type) {
            return specific;
        }
        warn!(
            "No template for project type '{}', using '{}'",
            project_type, DEFAULT_PROJECT_TYPE
        );
        self.types
            .get(DEFAULT_PROJECT_TYPE)
            .map_or("", String::as_str)
    }

    /// Build the task prompt.
    ///
    /// Pure function of its inputs: identical arguments always produce an
    /// identical prompt.
    pub fn build(
        &self,
        task: &str,
        snapshot: &RepositorySnapshot,
        project_type: &str,
    ) -> CodegenResult<String> {
        let context = PromptContext {
            base: &self.base,
            specific: self.project_template(project_type),
            project_type,
            is_new: snapshot.is_new,
            branch: &snapshot.branch,
            file_count: snapshot.file_list.len(),
            file_list_truncated: snapshot.file_list_truncated,
            files: &snapshot.file_list,
            key_files: &snapshot.key_files,
            task: task.trim(),
            contract: CLOSING_CONTRACT,
        };
        let prompt = self.handlebars.render(LAYOUT_NAME, &context)?;
        debug!(
            "Built prompt for project type '{}' ({} chars)",
            project_type,
            prompt.len()
        );
        Ok(prompt)
    }
}
