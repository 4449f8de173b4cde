//! Ollama local-inference backend adapter.
//!
//! Speaks Ollama's native protocol rather than its OpenAI shim, because the
//! native `/api/chat` endpoint exposes thinking output, image inputs, and
//! eval counts that the shim hides.
//!
//! - `POST {base}/api/chat` with `stream: true`
//! - Newline-delimited JSON objects, `done: true` on the final one
//! - `message.thinking` surfaced as reasoning; `message.content` may still
//!   embed `<think>` markers depending on the model, so it runs through the
//!   extraction filter
//! - `prompt_eval_count` / `eval_count` mapped to usage

use crate::reasoning::ReasoningExtractor;
use async_trait::async_trait;
use chatloom_core::chunk::{ResponseChunk, Usage};
use chatloom_core::error::ProviderError;
use chatloom_core::message::{
    ContentPart, ImageSource, Message, MessageContent, MessageToolCall, Role,
};
use chatloom_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse};
use chatloom_core::tool::ToolDefinition;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Adapter for a locally running Ollama server.
pub struct OllamaAdapter {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaAdapter {
    /// Create a new Ollama adapter. No API key — the server is local.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            // Local models can be slow to load on first request
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Convert canonical messages to Ollama's message shape.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };

                // Ollama takes images as a parallel base64 array, not as
                // content parts. URL images cannot be forwarded.
                let mut images: Vec<String> = Vec::new();
                if let MessageContent::Parts(parts) = &m.content {
                    for part in parts {
                        if let ContentPart::Image { source, .. } = part {
                            match source {
                                ImageSource::Inline { data, .. } => images.push(data.clone()),
                                ImageSource::Url { url } => {
                                    warn!(url = %url, "Ollama cannot fetch URL images; skipping");
                                }
                            }
                        }
                    }
                }

                let tool_calls: Vec<ApiToolCall> = m
                    .tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        function: ApiFunctionCall {
                            name: tc.name.clone(),
                            arguments: serde_json::from_str(&tc.arguments)
                                .unwrap_or(serde_json::json!({})),
                        },
                    })
                    .collect();

                ApiMessage {
                    role: role.into(),
                    content: m.text(),
                    images: if images.is_empty() { None } else { Some(images) },
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                }
            })
            .collect()
    }

    /// Ollama reuses the OpenAI tool-schema dialect.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut options = serde_json::json!({
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_tokens {
            options["num_predict"] = serde_json::json!(max_tokens);
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "stream": stream,
            "options": options,
        });
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        body
    }

    /// Assign synthetic ids to Ollama tool calls (the protocol has none).
    fn collect_tool_calls(
        api_calls: &[ApiToolCall],
        tool_calls: &mut Vec<MessageToolCall>,
    ) {
        for call in api_calls {
            let id = format!("call_{}", tool_calls.len());
            tool_calls.push(MessageToolCall {
                id,
                name: call.function.name.clone(),
                arguments: call.function.arguments.to_string(),
            });
        }
    }

    fn usage_from(resp: &ChatResponse) -> Option<Usage> {
        match (resp.prompt_eval_count, resp.eval_count) {
            (None, None) => None,
            (prompt, eval) => {
                let prompt = prompt.unwrap_or(0);
                let eval = eval.unwrap_or(0);
                Some(Usage {
                    prompt_tokens: prompt,
                    completion_tokens: eval,
                    total_tokens: prompt + eval,
                })
            }
        }
    }
}

#[async_trait]
impl Provider for OllamaAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::request_body(&request, false);

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Ollama API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: ChatResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Ollama response: {e}"),
            })?;

        let mut tool_calls = Vec::new();
        if let Some(calls) = &api_resp.message.tool_calls {
            Self::collect_tool_calls(calls, &mut tool_calls);
        }

        let usage = Self::usage_from(&api_resp);
        let model = api_resp.model.clone();

        Ok(ProviderResponse {
            message: Message::assistant_with_tool_calls(api_resp.message.content, tool_calls),
            usage,
            model,
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::request_body(&request, true);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut extractor = ReasoningExtractor::default();
            let mut tool_calls: Vec<MessageToolCall> = Vec::new();
            let mut usage: Option<Usage> = None;

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Each complete line is one JSON object
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() {
                        continue;
                    }

                    let resp = match serde_json::from_str::<ChatResponse>(&line) {
                        Ok(r) => r,
                        Err(e) => {
                            trace!(
                                provider = %provider_name,
                                line = %line,
                                error = %e,
                                "Ignoring unparseable Ollama stream line"
                            );
                            continue;
                        }
                    };

                    // Native thinking field bypasses the filter.
                    if let Some(thinking) = &resp.message.thinking {
                        if !thinking.is_empty()
                            && tx
                                .send(Ok(ResponseChunk::reasoning(thinking.clone())))
                                .await
                                .is_err()
                        {
                            return;
                        }
                    }

                    if !resp.message.content.is_empty() {
                        let split = extractor.push(&resp.message.content);
                        let chunk = ResponseChunk {
                            content: split.content,
                            reasoning: split.reasoning,
                            ..ResponseChunk::default()
                        };
                        if !chunk.is_empty() && tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }

                    if let Some(calls) = &resp.message.tool_calls {
                        Self::collect_tool_calls(calls, &mut tool_calls);
                    }

                    if resp.done {
                        usage = Self::usage_from(&resp);
                        let tail = extractor.finish();
                        if !tail.is_empty() {
                            let _ = tx
                                .send(Ok(ResponseChunk {
                                    content: tail.content,
                                    reasoning: tail.reasoning,
                                    ..ResponseChunk::default()
                                }))
                                .await;
                        }
                        let _ = tx
                            .send(Ok(ResponseChunk {
                                tool_calls: std::mem::take(&mut tool_calls),
                                usage,
                                done: true,
                                ..ResponseChunk::default()
                            }))
                            .await;
                        return;
                    }
                }
            }

            // Connection closed without a done message
            let tail = extractor.finish();
            if !tail.is_empty() {
                let _ = tx
                    .send(Ok(ResponseChunk {
                        content: tail.content,
                        reasoning: tail.reasoning,
                        ..ResponseChunk::default()
                    }))
                    .await;
            }
            let _ = tx
                .send(Ok(ResponseChunk {
                    tool_calls,
                    usage,
                    done: true,
                    ..ResponseChunk::default()
                }))
                .await;
        });

        Ok(rx)
    }

    async fn check(&self, model: &str) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(false);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let listed = body["models"]
            .as_array()
            .map(|arr| {
                arr.iter().any(|m| {
                    m["name"]
                        .as_str()
                        .map(|name| name == model || name.split(':').next() == Some(model))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);

        Ok(listed)
    }
}

// --- Ollama API types ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    /// Arrives as a JSON object, already complete
    arguments: serde_json::Value,
}

/// One line of the NDJSON chat stream (or the whole non-streaming body).
#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    message: ResponseMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}
