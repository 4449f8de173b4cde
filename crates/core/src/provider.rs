//! Provider trait — the abstraction over LLM backends.
//!
//! A provider adapter knows how to send a conversation to one backend
//! family and re-emit the backend's native stream as canonical
//! [`ResponseChunk`](crate::chunk::ResponseChunk) values.
//!
//! Implementations: OpenAI-compatible, Anthropic, Gemini, Ollama.

use crate::chunk::{ResponseChunk, Usage};
use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o", "claude-sonnet-4", "gemini-2.5-pro")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    /// A request with default sampling parameters and no tools.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
            tools: Vec::new(),
        }
    }
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// The receiver half of an adapter's chunk stream. Finite; not restartable.
pub type ChunkReceiver =
    tokio::sync::mpsc::Receiver<std::result::Result<ResponseChunk, ProviderError>>;

/// The core Provider trait.
///
/// Every backend adapter implements this trait. The tool-call loop and the
/// orchestrator call `stream()` without knowing which backend is in play.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of canonical chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a
    /// single terminal chunk.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(ResponseChunk {
                content: Some(response.message.text()),
                usage: response.usage,
                tool_calls: response.message.tool_calls,
                done: true,
                ..ResponseChunk::default()
            }))
            .await;
        Ok(rx)
    }

    /// Produce a short single-line title for a conversation.
    ///
    /// Used by configuration/UI surfaces outside the orchestrator registry.
    async fn summarize_title(
        &self,
        messages: &[Message],
        model: &str,
    ) -> std::result::Result<String, ProviderError> {
        let mut prompt = vec![Message::system(
            "Summarize the conversation topic as a short title of at most six words. \
             Reply with the title only — no quotes, no punctuation at the end.",
        )];
        prompt.extend(messages.iter().cloned());

        let request = ProviderRequest {
            max_tokens: Some(32),
            temperature: 0.3,
            ..ProviderRequest::new(model, prompt)
        };
        let response = self.complete(request).await?;
        Ok(clamp_title(&response.message.text()))
    }

    /// Capability probe — can this provider serve the given model?
    async fn check(&self, _model: &str) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

/// Reduce a model reply to a single title line of at most 80 characters.
pub fn clamp_title(raw: &str) -> String {
    let line = raw.lines().next().unwrap_or("").trim().trim_matches('"');
    let mut title: String = line.chars().take(80).collect();
    if title.is_empty() {
        title = "New conversation".into();
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_request_defaults() {
        let req = ProviderRequest::new("gpt-4o", vec![]);
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(req.max_tokens.is_none());
        assert!(req.tools.is_empty());
    }

    #[test]
    fn clamp_title_takes_first_line() {
        assert_eq!(clamp_title("\"Rust streams\"\nextra"), "Rust streams");
    }

    #[test]
    fn clamp_title_truncates_long_lines() {
        let long = "x".repeat(200);
        assert_eq!(clamp_title(&long).chars().count(), 80);
    }

    #[test]
    fn clamp_title_never_empty() {
        assert_eq!(clamp_title("   "), "New conversation");
    }

    #[tokio::test]
    async fn default_stream_wraps_complete() {
        struct Fixed;

        #[async_trait]
        impl Provider for Fixed {
            fn name(&self) -> &str {
                "fixed"
            }
            async fn complete(
                &self,
                _request: ProviderRequest,
            ) -> std::result::Result<ProviderResponse, ProviderError> {
                Ok(ProviderResponse {
                    message: Message::assistant("hello"),
                    usage: None,
                    model: "fixed-model".into(),
                })
            }
        }

        let mut rx = Fixed
            .stream(ProviderRequest::new("fixed-model", vec![Message::user("hi")]))
            .await
            .unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.content.as_deref(), Some("hello"));
        assert!(chunk.done);
        assert!(rx.recv().await.is_none());
    }
}
