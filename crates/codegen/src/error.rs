//! Error types for prompt building, generation and recovery.

use std::path::PathBuf;

use common::Transient;
use thiserror::Error;

/// Result alias for codegen operations.
pub type CodegenResult<T> = Result<T, CodegenError>;

/// Errors raised by the code-generation side of a run.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// Provider name is not in the registry
    #[error("unknown AI provider '{name}' (available: {available})")]
    UnknownProvider { name: String, available: String },

    /// Provider is known but its credentials are missing
    #[error("AI provider '{provider}' is not configured: {env_var} is not set")]
    ProviderNotConfigured {
        provider: &'static str,
        env_var: &'static str,
    },

    /// The base instruction template could not be loaded
    #[error("base prompt template not found at {}", path.display())]
    MissingBaseTemplate { path: PathBuf },

    /// Template directory could not be read
    #[error("failed to read prompt templates: {0}")]
    TemplateIo(#[from] std::io::Error),

    /// Template failed to compile or render
    #[error("prompt template error: {0}")]
    Template(String),

    /// Provider call failed before a response arrived
    #[error("AI provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("AI provider returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Provider answered successfully but without any text
    #[error("AI provider returned an empty response")]
    EmptyResponse,

    /// Provider reported an error inside a streamed response
    #[error("AI provider stream error: {0}")]
    Stream(String),

    /// Every recovery strategy failed
    #[error("unrecoverable AI response: {preview}")]
    Unrecoverable { preview: String },

    /// The response parsed, but yielded no valid operations
    #[error("AI response is empty or not an array: {reason}")]
    EmptyResult { reason: String },
}

impl CodegenError {
    /// Whether this error means the relay is misconfigured rather than the
    /// provider misbehaving.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownProvider { .. }
                | Self::ProviderNotConfigured { .. }
                | Self::MissingBaseTemplate { .. }
                | Self::TemplateIo(_)
                | Self::Template(_)
        )
    }

    /// Whether this error comes from a response that could not be turned
    /// into operations.
    #[must_use]
    pub const fn is_malformed_response(&self) -> bool {
        matches!(self, Self::Unrecoverable { .. } | Self::EmptyResult { .. })
    }
}

impl Transient for CodegenError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::EmptyResponse => true,
            _ => false,
        }
    }
}

impl From<handlebars::TemplateError> for CodegenError {
    fn from(e: handlebars::TemplateError) -> Self {
        Self::Template(e.to_string())
    }
}

impl From<handlebars::RenderError> for CodegenError {
    fn from(e: handlebars::RenderError) -> Self {
        Self::Template(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_and_server_errors_are_transient() {
        let rate_limited = CodegenError::Api {
            status: 429,
            message: "slow down".into(),
        };
        let unavailable = CodegenError::Api {
            status: 503,
            message: "unavailable".into(),
        };
        let bad_request = CodegenError::Api {
            status: 400,
            message: "bad".into(),
        };
        assert!(rate_limited.is_transient());
        assert!(unavailable.is_transient());
        assert!(!bad_request.is_transient());
    }

    #[test]
    fn test_malformed_response_is_not_transient() {
        let err = CodegenError::Unrecoverable {
            preview: "garbage".into(),
        };
        assert!(!err.is_transient());
        assert!(err.is_malformed_response());
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_unknown_provider_lists_choices() {
        let err = CodegenError::UnknownProvider {
            name: "gpt5".into(),
            available: "neuro, perplexity".into(),
        };
        assert!(err.is_configuration());
        assert!(err.to_string().contains("neuro, perplexity"));
    }
}
