//! OpenAI-compatible backend adapter.
//!
//! Works with: OpenAI, OpenRouter, DeepSeek, vLLM, Together AI, Fireworks
//! AI, and any endpoint exposing `/v1/chat/completions`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling with incremental argument fragments
//! - Vision content parts (`image_url`)
//! - Native `reasoning_content` deltas and embedded `<think>` markers

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
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// An OpenAI-compatible LLM backend adapter.
///
/// This handles the widest slice of hosted providers since most expose an
/// OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatAdapter {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatAdapter {
    /// Create a new OpenAI-compatible adapter.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Convert canonical messages to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::System => "system".into(),
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(Self::to_api_content(&m.content)),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Plain text stays a JSON string; parts become the array form with
    /// `text` and `image_url` entries.
    fn to_api_content(content: &MessageContent) -> serde_json::Value {
        match content {
            MessageContent::Text(text) => serde_json::json!(text),
            MessageContent::Parts(parts) => {
                let rendered: Vec<serde_json::Value> = parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => {
                            serde_json::json!({ "type": "text", "text": text })
                        }
                        ContentPart::Image { source, detail, .. } => {
                            let url = match source {
                                ImageSource::Url { url } => url.clone(),
                                ImageSource::Inline { media_type, data } => {
                                    format!("data:{media_type};base64,{data}")
                                }
                            };
                            let mut image_url = serde_json::json!({ "url": url });
                            if let Some(detail) = detail {
                                image_url["detail"] = serde_json::json!(detail);
                            }
                            serde_json::json!({ "type": "image_url", "image_url": image_url })
                        }
                    })
                    .collect();
                serde_json::json!(rendered)
            }
        }
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        body
    }

    fn status_error(status: u16, body: String) -> ProviderError {
        match status {
            429 => ProviderError::RateLimited {
                retry_after_secs: 5,
            },
            401 | 403 => ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ),
            _ => ProviderError::ApiError {
                status_code: status,
                message: body,
            },
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request, false);

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(Self::status_error(status, error_body));
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice =
            api_response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 200,
                    message: "No choices in response".into(),
                })?;

        let tool_calls: Vec<MessageToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let content = choice
            .message
            .content
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();

        let message = Message::assistant_with_tool_calls(content, tool_calls);

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message,
            usage,
            model: api_response.model,
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request, true);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider streaming error");
            return Err(Self::status_error(status, error_body));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn a task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut extractor = ReasoningExtractor::default();
            let mut usage: Option<Usage> = None;

            // Accumulators for tool call deltas, keyed by index. A BTreeMap
            // keeps the backend's emission order for sequential execution.
            let mut accumulators: BTreeMap<u32, ToolCallAccumulator> = BTreeMap::new();

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

                // Process complete lines
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        finish_stream(&tx, &mut extractor, &accumulators, usage).await;
                        return;
                    }

                    let stream_resp = match serde_json::from_str::<StreamResponse>(data) {
                        Ok(resp) => resp,
                        Err(e) => {
                            trace!(
                                provider = %provider_name,
                                data = %data,
                                error = %e,
                                "Ignoring unparseable SSE chunk"
                            );
                            continue;
                        }
                    };

                    if let Some(choice) = stream_resp.choices.first() {
                        let delta = &choice.delta;

                        if let Some(ref tc_deltas) = delta.tool_calls {
                            for tc_delta in tc_deltas {
                                let acc = accumulators.entry(tc_delta.index).or_default();
                                if let Some(ref id) = tc_delta.id {
                                    acc.id = id.clone();
                                }
                                if let Some(ref func) = tc_delta.function {
                                    if let Some(ref name) = func.name {
                                        acc.name = name.clone();
                                    }
                                    if let Some(ref args) = func.arguments {
                                        acc.arguments.push_str(args);
                                    }
                                }
                            }
                        }

                        // Backend-native reasoning bypasses the filter.
                        if let Some(ref reasoning) = delta.reasoning_content {
                            if !reasoning.is_empty()
                                && tx
                                    .send(Ok(ResponseChunk::reasoning(reasoning.clone())))
                                    .await
                                    .is_err()
                            {
                                return;
                            }
                        }

                        // Text deltas run through the marker filter.
                        if let Some(ref content) = delta.content {
                            if !content.is_empty() {
                                let split = extractor.push(content);
                                let chunk = ResponseChunk {
                                    content: split.content,
                                    reasoning: split.reasoning,
                                    ..ResponseChunk::default()
                                };
                                if !chunk.is_empty() && tx.send(Ok(chunk)).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }

                    // Usage arrives on a trailing chunk when stream_options
                    // asks for it.
                    if let Some(u) = stream_resp.usage {
                        usage = Some(Usage {
                            prompt_tokens: u.prompt_tokens,
                            completion_tokens: u.completion_tokens,
                            total_tokens: u.total_tokens,
                        });
                    }
                }
            }

            // Stream ended without [DONE]
            finish_stream(&tx, &mut extractor, &accumulators, usage).await;
        });

        Ok(rx)
    }

    async fn check(&self, model: &str) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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

        let listed = body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .any(|m| m["id"].as_str() == Some(model))
            })
            .unwrap_or(false);

        // Some gateways don't enumerate models; a reachable endpoint with an
        // empty catalog still counts as available.
        Ok(listed || body["data"].as_array().is_none_or(|arr| arr.is_empty()))
    }
}

/// Flush the filter and emit the terminal chunk with assembled tool calls.
async fn finish_stream(
    tx: &tokio::sync::mpsc::Sender<std::result::Result<ResponseChunk, ProviderError>>,
    extractor: &mut ReasoningExtractor,
    accumulators: &BTreeMap<u32, ToolCallAccumulator>,
    usage: Option<Usage>,
) {
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

    let tool_calls: Vec<MessageToolCall> =
        accumulators.values().map(|acc| acc.to_tool_call()).collect();

    let _ = tx
        .send(Ok(ResponseChunk {
            tool_calls,
            usage,
            done: true,
            ..ResponseChunk::default()
        }))
        .await;
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta — arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn to_tool_call(&self) -> MessageToolCall {
        MessageToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatloom_core::message::{ContentPart, ImageDetail};

    #[test]
    fn constructor_trims_trailing_slash() {
        let adapter = OpenAiCompatAdapter::new("openai", "https://api.openai.com/v1/", "sk-test");
        assert_eq!(adapter.name(), "openai");
        assert_eq!(adapter.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiCompatAdapter::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
        assert_eq!(
            api_messages[1].content.as_ref().unwrap(),
            &serde_json::json!("Hello")
        );
    }

    #[test]
    fn message_conversion_with_image_parts() {
        let msg = Message::user_parts(vec![
            ContentPart::Text {
                text: "what is this?".into(),
            },
            ContentPart::Image {
                source: ImageSource::Inline {
                    media_type: "image/png".into(),
                    data: "QUJD".into(),
                },
                detail: Some(ImageDetail::High),
                dimensions: None,
            },
        ]);
        let api_msgs = OpenAiCompatAdapter::to_api_messages(&[msg]);
        let content = api_msgs[0].content.as_ref().unwrap();
        let parts = content.as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(
            parts[1]["image_url"]["url"],
            "data:image/png;base64,QUJD"
        );
        assert_eq!(parts[1]["image_url"]["detail"], "high");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = Message::assistant_with_tool_calls(
            "checking...",
            vec![MessageToolCall {
                id: "call_1".into(),
                name: "web_search".into(),
                arguments: r#"{"query":"rust"}"#.into(),
            }],
        );
        let api_msgs = OpenAiCompatAdapter::to_api_messages(&[msg]);
        let tc = api_msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc.len(), 1);
        assert_eq!(tc[0].function.name, "web_search");
        assert_eq!(tc[0].r#type, "function");
    }

    #[test]
    fn message_conversion_tool_response() {
        let msg = Message::tool_result("call_1", "result data");
        let api_msgs = OpenAiCompatAdapter::to_api_messages(&[msg]);
        assert_eq!(api_msgs[0].role, "tool");
        assert_eq!(api_msgs[0].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "calculator".into(),
            description: "Evaluate math".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api_tools = OpenAiCompatAdapter::to_api_tools(&tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "calculator");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn streaming_body_requests_usage() {
        let req = ProviderRequest::new("gpt-4o", vec![Message::user("hi")]);
        let body = OpenAiCompatAdapter::request_body(&req, true);
        assert_eq!(body["stream"], serde_json::json!(true));
        assert_eq!(
            body["stream_options"]["include_usage"],
            serde_json::json!(true)
        );
    }

    // --- SSE parsing tests ---

    #[test]
    fn parse_stream_content_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("Hello"));
    }

    #[test]
    fn parse_stream_reasoning_delta() {
        let data = r#"{"choices":[{"delta":{"reasoning_content":"hmm"},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(
            parsed.choices[0].delta.reasoning_content.as_deref(),
            Some("hmm")
        );
        assert!(parsed.choices[0].delta.content.is_none());
    }

    #[test]
    fn parse_stream_tool_call_delta() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_abc","function":{"name":"calculator","arguments":""}}]},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        let tc = &parsed.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(tc.index, 0);
        assert_eq!(tc.id.as_deref(), Some("call_abc"));
        assert_eq!(
            tc.function.as_ref().unwrap().name.as_deref(),
            Some("calculator")
        );
    }

    #[test]
    fn parse_stream_tool_call_arguments_delta() {
        // Arguments arrive incrementally as fragments
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"expr\""}}]},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        let tc = &parsed.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert!(tc.id.is_none()); // ID only in first delta
        assert_eq!(
            tc.function.as_ref().unwrap().arguments.as_deref(),
            Some("{\"expr\"")
        );
    }

    #[test]
    fn parse_stream_usage() {
        let data = r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        let usage = parsed.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn tool_call_accumulator_assembly() {
        let mut acc = ToolCallAccumulator::default();
        // First delta: id + name
        acc.id = "call_123".into();
        acc.name = "calculator".into();
        acc.arguments.push_str("{\"expr\"");
        // Second delta: more arguments
        acc.arguments.push_str(": \"2+2\"}");

        let tc = acc.to_tool_call();
        assert_eq!(tc.id, "call_123");
        assert_eq!(tc.name, "calculator");
        assert_eq!(tc.arguments, "{\"expr\": \"2+2\"}");
    }

    #[test]
    fn accumulators_preserve_emission_order() {
        let mut accs: BTreeMap<u32, ToolCallAccumulator> = BTreeMap::new();
        accs.entry(1).or_default().name = "second".into();
        accs.entry(0).or_default().name = "first".into();
        let names: Vec<&str> = accs.values().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn parse_empty_delta() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert!(parsed.choices[0].delta.content.is_none());
        assert!(parsed.choices[0].delta.tool_calls.is_none());
    }

    #[test]
    fn status_error_mapping() {
        assert!(matches!(
            OpenAiCompatAdapter::status_error(429, String::new()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            OpenAiCompatAdapter::status_error(401, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            OpenAiCompatAdapter::status_error(500, String::new()),
            ProviderError::ApiError {
                status_code: 500,
                ..
            }
        ));
    }
}
