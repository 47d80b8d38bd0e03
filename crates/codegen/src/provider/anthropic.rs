//! Anthropic Messages API provider (streaming).
//!
//! The Messages API has no schema-constrained output, so the operations
//! contract travels in the system prompt only.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::{AIProvider, SYSTEM_PROMPT};
use crate::error::{CodegenError, CodegenResult};

/// Anthropic API endpoint
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

const MAX_TOKENS: u32 = 32_000;

/// Map short names to canonical API model names.
fn normalize_model(model: &str) -> &str {
    match model {
        "opus" => "claude-opus-4-5-20251101",
        "sonnet" => "claude-sonnet-4-5-20250929",
        "haiku" => "claude-3-5-haiku-20241022",
        _ => model,
    }
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: u32,
    system: &'static str,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicError,
}

/// Streaming event types
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: StreamMessage },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: ContentDelta },
    #[serde(rename = "message_delta")]
    MessageDelta {
        delta: MessageDeltaContent,
        usage: Option<StreamUsage>,
    },
    #[serde(rename = "error")]
    Error { error: AnthropicError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    model: String,
    usage: StreamUsage,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ContentDelta {
    #[serde(rename = "type")]
    delta_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaContent {
    #[serde(default)]
    stop_reason: Option<String>,
}

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicProvider {
    /// Create a provider with a per-request timeout.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> CodegenResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    /// Set a custom base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Override the model; short names ("opus", "sonnet", "haiku") are expanded.
    #[must_use]
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = normalize_model(model).to_string();
        self
    }

    /// Apply one SSE event to the accumulated text. Returns an error for
    /// in-stream failures.
    fn apply_event(data: &str, text: &mut String) -> CodegenResult<()> {
        let Ok(event) = serde_json::from_str::<StreamEvent>(data) else {
            return Ok(());
        };
        match event {
            StreamEvent::MessageStart { message } => {
                debug!(
                    "Anthropic model {} input tokens: {}",
                    message.model, message.usage.input_tokens
                );
            }
            StreamEvent::ContentBlockDelta { delta } => {
                if delta.delta_type == "text_delta" {
                    text.push_str(&delta.text);
                }
            }
            StreamEvent::MessageDelta { delta, usage } => {
                if let Some(u) = usage {
                    debug!("Anthropic output tokens: {}", u.output_tokens);
                }
                if delta.stop_reason.as_deref() == Some("max_tokens") {
                    info!("Anthropic response stopped at the token limit");
                }
            }
            StreamEvent::Error { error } => {
                return Err(CodegenError::Stream(format!(
                    "{} - {}",
                    error.error_type, error.message
                )));
            }
            StreamEvent::Other => {}
        }
        Ok(())
    }
}

#[async_trait]
impl AIProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_code(&self, prompt: &str) -> CodegenResult<String> {
        let request = AnthropicRequest {
            model: &self.model,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: MAX_TOKENS,
            system: SYSTEM_PROMPT,
            temperature: 0.2,
            stream: true,
        };

        info!(
            "Calling Anthropic ({}) with {} char prompt (streaming)",
            self.model,
            prompt.len()
        );

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            let message = serde_json::from_str::<AnthropicErrorResponse>(&body).map_or_else(
                |_| common::truncate_chars(&body, 500),
                |e| format!("{} - {}", e.error.error_type, e.error.message),
            );
            return Err(CodegenError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let mut full_text = String::new();
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(event_end) = buffer.find("\n\n") {
                let event_data: String = buffer.drain(..event_end + 2).collect();
                for line in event_data.lines() {
                    if let Some(data) = line.strip_prefix("data: ") {
                        if data != "[DONE]" {
                            Self::apply_event(data, &mut full_text)?;
                        }
                    }
                }
            }
            trace!("Generated {} chars...", full_text.len());
        }

        // Trailing event without a terminating blank line
        for line in buffer.lines() {
            if let Some(data) = line.strip_prefix("data: ") {
                Self::apply_event(data, &mut full_text)?;
            }
        }

        let text = full_text.trim().to_string();
        if text.is_empty() {
            return Err(CodegenError::EmptyResponse);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_model_names_expand() {
        let provider = AnthropicProvider::new("k", Duration::from_secs(1))
            .unwrap()
            .with_model("opus");
        assert_eq!(provider.model(), "claude-opus-4-5-20251101");
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    fn test_text_deltas_accumulate() {
        let mut text = String::new();
        AnthropicProvider::apply_event(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"[{\"path\""}}"#,
            &mut text,
        )
        .unwrap();
        AnthropicProvider::apply_event(r#"{"type":"ping"}"#, &mut text).unwrap();
        AnthropicProvider::apply_event(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":":1}]"}}"#,
            &mut text,
        )
        .unwrap();
        assert_eq!(text, r#"[{"path":1}]"#);
    }

    #[test]
    fn test_stream_error_event_fails() {
        let mut text = String::new();
        let err = AnthropicProvider::apply_event(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
            &mut text,
        )
        .unwrap_err();
        assert!(matches!(err, CodegenError::Stream(_)));
    }
}
