//! Code-generation provider abstraction.
//!
//! A provider sends an assembled prompt to one backend and returns the raw
//! text payload. Parsing and repair belong to [`crate::recovery`]; providers
//! never interpret the response beyond extracting its text.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::CodegenResult;

pub mod anthropic;
pub mod chat;

pub use anthropic::AnthropicProvider;
pub use chat::{AuthScheme, ChatCompletionsProvider, OutputSchema, ProviderProfile};

/// Instructions sent as the system message by every provider.
pub const SYSTEM_PROMPT: &str = "You are an autonomous programming agent. You communicate only \
through a JSON array of file operations matching the declared schema. Never add prose, \
markdown or code fences around the array. \"action\" is exactly one of \"create\", \"update\" \
or \"delete\". Paths are relative with no leading slash. Encode line breaks inside \"content\" \
as \\n and escape backslashes and quotes. Use null content for deletes.";

/// Interface every code-generation backend implements.
#[async_trait]
pub trait AIProvider: Send + Sync {
    /// Registry name of the provider (e.g. "neuro", "anthropic").
    fn name(&self) -> &'static str;

    /// Model identifier sent to the backend.
    fn model(&self) -> &str;

    /// Send the prompt and return the backend's raw text payload.
    ///
    /// Non-success statuses and empty payloads are errors, never an empty
    /// success.
    async fn generate_code(&self, prompt: &str) -> CodegenResult<String>;
}

/// Strict operations schema: enumerated actions, nullable content.
#[must_use]
pub fn strict_operations_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "required": ["path", "action", "content"],
            "additionalProperties": false,
            "properties": {
                "path": { "type": "string" },
                "action": { "type": "string", "enum": ["create", "update", "delete"] },
                "content": { "type": ["string", "null"] }
            }
        }
    })
}

/// Strict schema with an object root, for backends that reject array roots.
/// The operations array sits under `operations`.
#[must_use]
pub fn wrapped_operations_schema() -> Value {
    json!({
        "type": "object",
        "required": ["operations"],
        "additionalProperties": false,
        "properties": {
            "operations": strict_operations_schema()
        }
    })
}

/// Relaxed operations schema for backends that reject enums.
///
/// The action vocabulary is carried by the prompt instead.
#[must_use]
pub fn relaxed_operations_schema() -> Value {
    json!({
        "type": "array",
        "minItems": 1,
        "maxItems": 60,
        "items": {
            "type": "object",
            "required": ["path", "action", "content"],
            "additionalProperties": false,
            "properties": {
                "path": { "type": "string" },
                "action": { "type": "string" },
                "content": { "type": ["string", "null"] }
            }
        }
    })
}
