//! OpenAI-compatible chat-completions provider.
//!
//! NeuroAPI, Perplexity, Yandex Foundation Models and OpenAI all speak the
//! same `/chat/completions` protocol; they differ only in endpoint,
//! authentication, extra headers and how the output schema is declared.
//! Each backend is a [`ProviderProfile`] preset driving one implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{
    relaxed_operations_schema, strict_operations_schema, wrapped_operations_schema, AIProvider,
    SYSTEM_PROMPT,
};
use crate::error::{CodegenError, CodegenResult};

/// NeuroAPI endpoint (Gemini models behind an OpenAI-compatible API)
pub const NEURO_API_URL: &str = "https://neuroapi.host/v1/chat/completions";

/// Perplexity endpoint
pub const PERPLEXITY_API_URL: &str = "https://api.perplexity.ai/chat/completions";

/// Yandex Foundation Models OpenAI-compatible endpoint
pub const YANDEX_API_URL: &str =
    "https://llm.api.cloud.yandex.net/foundationModels/v1/chat/completions";

/// OpenAI endpoint
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const SCHEMA_NAME: &str = "file_operations";

/// How the API key is presented in the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `Authorization: Api-Key <key>`
    ApiKey,
}

impl AuthScheme {
    fn header_value(self, key: &str) -> String {
        match self {
            Self::Bearer => format!("Bearer {key}"),
            Self::ApiKey => format!("Api-Key {key}"),
        }
    }
}

/// How the backend is told about the expected output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSchema {
    /// `response_format: {type: json_schema, json_schema: {strict: true, ...}}`
    StrictJsonSchema,
    /// As `StrictJsonSchema`, with the array wrapped in an object root
    StrictObjectSchema,
    /// Gemini-style `generation_config` with a relaxed schema
    GenerationConfig,
    /// No schema; the prompt carries the contract
    PromptOnly,
}

/// Fixed configuration of one chat-completions backend.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Registry name
    pub name: &'static str,
    /// Full chat-completions URL
    pub endpoint: String,
    /// Model identifier
    pub model: String,
    /// Authorization header scheme
    pub auth: AuthScheme,
    /// Extra headers sent with every request
    pub headers: Vec<(String, String)>,
    /// Output schema declaration
    pub schema: OutputSchema,
    /// Sampling temperature
    pub temperature: f32,
    /// Generation token limit
    pub max_tokens: u32,
}

impl ProviderProfile {
    /// Gemini through NeuroAPI.
    #[must_use]
    pub fn neuro() -> Self {
        Self {
            name: "neuro",
            endpoint: NEURO_API_URL.to_string(),
            model: "gemini-3-pro-preview-thinking".to_string(),
            auth: AuthScheme::Bearer,
            headers: Vec::new(),
            schema: OutputSchema::GenerationConfig,
            temperature: 0.2,
            max_tokens: 32_000,
        }
    }

    /// Perplexity Sonar.
    #[must_use]
    pub fn perplexity() -> Self {
        Self {
            name: "perplexity",
            endpoint: PERPLEXITY_API_URL.to_string(),
            model: "sonar-pro".to_string(),
            auth: AuthScheme::Bearer,
            headers: Vec::new(),
            schema: OutputSchema::StrictJsonSchema,
            temperature: 0.4,
            max_tokens: 16_000,
        }
    }

    /// Yandex Foundation Models; requests are billed to `folder_id`.
    #[must_use]
    pub fn yandex(folder_id: impl Into<String>) -> Self {
        Self {
            name: "yandex",
            endpoint: YANDEX_API_URL.to_string(),
            model: "qwen3-235b-a22b-fp8/latest".to_string(),
            auth: AuthScheme::ApiKey,
            headers: vec![("X-Folder-ID".to_string(), folder_id.into())],
            schema: OutputSchema::StrictJsonSchema,
            temperature: 0.3,
            max_tokens: 16_000,
        }
    }

    /// OpenAI.
    #[must_use]
    pub fn openai() -> Self {
        Self {
            name: "openai",
            endpoint: OPENAI_API_URL.to_string(),
            model: "gpt-4o".to_string(),
            auth: AuthScheme::Bearer,
            headers: Vec::new(),
            schema: OutputSchema::StrictObjectSchema,
            temperature: 0.2,
            max_tokens: 16_000,
        }
    }

    /// Override the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the endpoint (proxies, tests).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

fn strict_format(schema: Value) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": SCHEMA_NAME,
            "strict": true,
            "schema": schema,
        }
    })
}

/// Provider for any OpenAI-compatible chat-completions backend.
pub struct ChatCompletionsProvider {
    client: Client,
    profile: ProviderProfile,
    api_key: String,
}

impl ChatCompletionsProvider {
    /// Create a provider with a per-request timeout.
    pub fn new(
        profile: ProviderProfile,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> CodegenResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            profile,
            api_key: api_key.into(),
        })
    }

    /// The profile driving this provider.
    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        let (response_format, generation_config) = match self.profile.schema {
            OutputSchema::StrictJsonSchema => (Some(strict_format(strict_operations_schema())), None),
            OutputSchema::StrictObjectSchema => (Some(strict_format(wrapped_operations_schema())), None),
            OutputSchema::GenerationConfig => (
                None,
                Some(json!({
                    "response_mime_type": "application/json",
                    "response_schema": relaxed_operations_schema(),
                })),
            ),
            OutputSchema::PromptOnly => (None, None),
        };

        ChatRequest {
            model: &self.profile.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.profile.temperature,
            max_tokens: self.profile.max_tokens,
            response_format,
            generation_config,
        }
    }
}

#[async_trait]
impl AIProvider for ChatCompletionsProvider {
    fn name(&self) -> &'static str {
        self.profile.name
    }

    fn model(&self) -> &str {
        &self.profile.model
    }

    async fn generate_code(&self, prompt: &str) -> CodegenResult<String> {
        info!(
            "Calling {} ({}) with {} char prompt",
            self.profile.name,
            self.profile.model,
            prompt.len()
        );

        let mut request = self
            .client
            .post(&self.profile.endpoint)
            .header(
                reqwest::header::AUTHORIZATION,
                self.profile.auth.header_value(&self.api_key),
            )
            .json(&self.request(prompt));
        for (name, value) in &self.profile.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map_or_else(|_| common::truncate_chars(&body, 500), |e| e.error.message);
            return Err(CodegenError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| CodegenError::Api {
                status: status.as_u16(),
                message: format!("undecodable response body: {e}"),
            })?;

        let choice = parsed.choices.into_iter().next();
        if let Some(reason) = choice.as_ref().and_then(|c| c.finish_reason.as_deref()) {
            debug!("{} finish_reason: {}", self.profile.name, reason);
        }
        let text = choice
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(CodegenError::EmptyResponse);
        }

        debug!(
            "{} returned {} chars: {}",
            self.profile.name,
            text.len(),
            common::truncate_chars(&text, 200)
        );
        Ok(text)
    }
}
