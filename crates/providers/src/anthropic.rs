//! Anthropic native backend adapter.
//!
//! Uses Anthropic's Messages API directly (not an OpenAI-compatible proxy).
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via SSE with `content_block_delta` events
//! - Extended thinking surfaced as reasoning chunks

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

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API adapter.
pub struct AnthropicAdapter {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    /// Create a new Anthropic adapter.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            // Anthropic can be slow with extended thinking
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Extract system messages from the message list.
    /// Anthropic puts the system prompt as a top-level field, not in messages.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut non_system: Vec<&Message> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(msg.text()),
                _ => non_system.push(msg),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, non_system)
    }

    /// Convert canonical content into Anthropic content blocks.
    fn content_blocks(content: &MessageContent) -> Vec<ContentBlock> {
        match content {
            MessageContent::Text(text) => vec![ContentBlock::Text { text: text.clone() }],
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => ContentBlock::Text { text: text.clone() },
                    ContentPart::Image { source, .. } => ContentBlock::Image {
                        source: match source {
                            ImageSource::Inline { media_type, data } => serde_json::json!({
                                "type": "base64",
                                "media_type": media_type,
                                "data": data,
                            }),
                            ImageSource::Url { url } => serde_json::json!({
                                "type": "url",
                                "url": url,
                            }),
                        },
                    },
                })
                .collect(),
        }
    }

    /// Convert messages to Anthropic API format with content blocks.
    fn to_api_messages(messages: &[&Message]) -> Vec<AnthropicMessage> {
        let mut result = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User => {
                    let content = if msg.content.has_images() {
                        AnthropicContent::Blocks(Self::content_blocks(&msg.content))
                    } else {
                        AnthropicContent::Text(msg.text())
                    };
                    result.push(AnthropicMessage {
                        role: "user".into(),
                        content,
                    });
                }
                Role::Assistant => {
                    if msg.tool_calls.is_empty() {
                        result.push(AnthropicMessage {
                            role: "assistant".into(),
                            content: AnthropicContent::Text(msg.text()),
                        });
                    } else {
                        // Assistant message with tool use blocks
                        let mut blocks: Vec<ContentBlock> = Vec::new();
                        let text = msg.text();
                        if !text.is_empty() {
                            blocks.push(ContentBlock::Text { text });
                        }
                        for tc in &msg.tool_calls {
                            let input: serde_json::Value =
                                serde_json::from_str(&tc.arguments).unwrap_or_default();
                            blocks.push(ContentBlock::ToolUse {
                                id: tc.id.clone(),
                                name: tc.name.clone(),
                                input,
                            });
                        }
                        result.push(AnthropicMessage {
                            role: "assistant".into(),
                            content: AnthropicContent::Blocks(blocks),
                        });
                    }
                }
                Role::Tool => {
                    // Tool results travel as user messages with result blocks
                    let tool_call_id = msg.tool_call_id.clone().unwrap_or_default();
                    result.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Blocks(vec![ContentBlock::ToolResult {
                            tool_use_id: tool_call_id,
                            content: msg.text(),
                        }]),
                    });
                }
                Role::System => {} // handled separately
            }
        }

        result
    }

    /// Convert tool definitions to Anthropic format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let (system, messages) = Self::extract_system(&request.messages);
        let api_messages = Self::to_api_messages(&messages);
        let max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": api_messages,
            "max_tokens": max_tokens,
            "temperature": request.temperature,
        });
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        if let Some(ref sys) = system {
            body["system"] = serde_json::json!(sys);
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
            401 | 403 => {
                ProviderError::AuthenticationFailed("Invalid Anthropic API key".into())
            }
            _ => ProviderError::ApiError {
                status_code: status,
                message: body,
            },
        }
    }

    /// Convert an Anthropic API response to a ProviderResponse.
    fn response_to_provider_response(
        resp: AnthropicResponse,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut text_content = String::new();
        let mut tool_calls = Vec::new();

        for block in &resp.content {
            match block {
                ResponseContentBlock::Text { text } => {
                    if !text_content.is_empty() {
                        text_content.push('\n');
                    }
                    text_content.push_str(text);
                }
                ResponseContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(MessageToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: serde_json::to_string(input).unwrap_or_default(),
                    });
                }
                // Non-streaming callers only want the final answer; the
                // thinking block is dropped here and only surfaced on the
                // streaming path.
                ResponseContentBlock::Thinking { .. } => {}
            }
        }

        let message = Message::assistant_with_tool_calls(text_content, tool_calls);

        let usage = Some(Usage {
            prompt_tokens: resp.usage.input_tokens,
            completion_tokens: resp.usage.output_tokens,
            total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
        });

        Ok(ProviderResponse {
            message,
            usage,
            model: resp.model,
        })
    }
}

#[async_trait]
impl Provider for AnthropicAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::request_body(&request, false);

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(Self::status_error(status, error_body));
        }

        let api_resp: AnthropicResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Anthropic response: {e}"),
            })?;

        Self::response_to_provider_response(api_resp)
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::request_body(&request, true);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, error_body));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut extractor = ReasoningExtractor::default();

            // Accumulators
            let mut current_tool_id = String::new();
            let mut current_tool_name = String::new();
            let mut tool_args_buffer = String::new();
            let mut tool_calls: Vec<MessageToolCall> = Vec::new();
            let mut in_tool_use = false;
            let mut prompt_tokens: u32 = 0;
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

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    if let Some(event_type) = line.strip_prefix("event: ") {
                        if event_type.trim() == "message_stop" {
                            // Finalize any pending tool call
                            if in_tool_use {
                                tool_calls.push(MessageToolCall {
                                    id: std::mem::take(&mut current_tool_id),
                                    name: std::mem::take(&mut current_tool_name),
                                    arguments: std::mem::take(&mut tool_args_buffer),
                                });
                                in_tool_use = false;
                            }
                            finish_stream(&tx, &mut extractor, std::mem::take(&mut tool_calls), usage)
                                .await;
                            return;
                        }
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();
                    if data.is_empty() {
                        continue;
                    }

                    let event: serde_json::Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                            continue;
                        }
                    };

                    match event["type"].as_str().unwrap_or("") {
                        "message_start" => {
                            if let Some(inp) =
                                event["message"]["usage"]["input_tokens"].as_u64()
                            {
                                prompt_tokens = inp as u32;
                            }
                        }
                        "content_block_start" => {
                            let block = &event["content_block"];
                            if block["type"].as_str() == Some("tool_use") {
                                // Finalize previous tool if any
                                if in_tool_use {
                                    tool_calls.push(MessageToolCall {
                                        id: std::mem::take(&mut current_tool_id),
                                        name: std::mem::take(&mut current_tool_name),
                                        arguments: std::mem::take(&mut tool_args_buffer),
                                    });
                                }
                                current_tool_id = block["id"].as_str().unwrap_or("").to_string();
                                current_tool_name =
                                    block["name"].as_str().unwrap_or("").to_string();
                                tool_args_buffer.clear();
                                in_tool_use = true;
                            }
                        }
                        "content_block_delta" => {
                            let delta = &event["delta"];
                            match delta["type"].as_str().unwrap_or("") {
                                "text_delta" => {
                                    if let Some(text) = delta["text"].as_str() {
                                        let split = extractor.push(text);
                                        let chunk = ResponseChunk {
                                            content: split.content,
                                            reasoning: split.reasoning,
                                            ..ResponseChunk::default()
                                        };
                                        if !chunk.is_empty()
                                            && tx.send(Ok(chunk)).await.is_err()
                                        {
                                            return;
                                        }
                                    }
                                }
                                "input_json_delta" => {
                                    if let Some(partial) = delta["partial_json"].as_str() {
                                        tool_args_buffer.push_str(partial);
                                    }
                                }
                                // Extended thinking separates reasoning
                                // structurally — bypasses the filter.
                                "thinking_delta" => {
                                    if let Some(thinking) = delta["thinking"].as_str() {
                                        if tx
                                            .send(Ok(ResponseChunk::reasoning(thinking)))
                                            .await
                                            .is_err()
                                        {
                                            return;
                                        }
                                    }
                                }
                                _ => {}
                            }
                        }
                        "content_block_stop" => {
                            if in_tool_use {
                                tool_calls.push(MessageToolCall {
                                    id: std::mem::take(&mut current_tool_id),
                                    name: std::mem::take(&mut current_tool_name),
                                    arguments: std::mem::take(&mut tool_args_buffer),
                                });
                                in_tool_use = false;
                            }
                        }
                        "message_delta" => {
                            // Carries cumulative output token usage
                            if let Some(out) = event["usage"]["output_tokens"].as_u64() {
                                let snapshot = Usage {
                                    prompt_tokens,
                                    completion_tokens: out as u32,
                                    total_tokens: prompt_tokens + out as u32,
                                };
                                usage = Some(snapshot);
                                if tx
                                    .send(Ok(ResponseChunk {
                                        usage: Some(snapshot),
                                        ..ResponseChunk::default()
                                    }))
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }

            // Stream ended without message_stop
            if in_tool_use {
                tool_calls.push(MessageToolCall {
                    id: std::mem::take(&mut current_tool_id),
                    name: std::mem::take(&mut current_tool_name),
                    arguments: std::mem::take(&mut tool_args_buffer),
                });
            }
            finish_stream(&tx, &mut extractor, tool_calls, usage).await;
        });

        Ok(rx)
    }

    async fn check(&self, model: &str) -> std::result::Result<bool, ProviderError> {
        // Minimal one-token request to verify key + model in one probe
        let url = format!("{}/v1/messages", self.base_url);
        let body = serde_json::json!({
            "model": model,
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 1,
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

/// Flush the filter and emit the terminal chunk.
async fn finish_stream(
    tx: &tokio::sync::mpsc::Sender<std::result::Result<ResponseChunk, ProviderError>>,
    extractor: &mut ReasoningExtractor,
    tool_calls: Vec<MessageToolCall>,
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
    let _ = tx
        .send(Ok(ResponseChunk {
            tool_calls,
            usage,
            done: true,
            ..ResponseChunk::default()
        }))
        .await;
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { source: serde_json::Value },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[allow(dead_code)]
    id: String,
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "thinking")]
    Thinking {
        #[allow(dead_code)]
        thinking: String,
    },
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatloom_core::message::{ContentPart, ImageDetail};

    fn adapter() -> AnthropicAdapter {
        AnthropicAdapter::new("anthropic", "https://api.anthropic.com", "sk-ant-test")
    }

    #[test]
    fn constructor() {
        let a = adapter();
        assert_eq!(a.name(), "anthropic");
        assert_eq!(a.base_url, "https://api.anthropic.com");
    }

    #[test]
    fn system_extraction() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::system("Be concise"),
            Message::user("Hello"),
            Message::assistant("Hi!"),
        ];

        let (system, non_system) = AnthropicAdapter::extract_system(&messages);
        assert_eq!(system.as_deref(), Some("You are helpful\n\nBe concise"));
        assert_eq!(non_system.len(), 2);
        assert_eq!(non_system[0].role, Role::User);
        assert_eq!(non_system[1].role, Role::Assistant);
    }

    #[test]
    fn system_extraction_no_system() {
        let messages = vec![Message::user("Hello")];
        let (system, non_system) = AnthropicAdapter::extract_system(&messages);
        assert!(system.is_none());
        assert_eq!(non_system.len(), 1);
    }

    #[test]
    fn request_body_places_system_top_level() {
        let req = ProviderRequest::new(
            "claude-sonnet-4",
            vec![Message::system("Be brief"), Message::user("Hello")],
        );
        let body = AnthropicAdapter::request_body(&req, true);
        assert_eq!(body["system"], serde_json::json!("Be brief"));
        assert_eq!(body["stream"], serde_json::json!(true));
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = Message::assistant_with_tool_calls(
            "Let me search",
            vec![MessageToolCall {
                id: "toolu_123".into(),
                name: "web_search".into(),
                arguments: r#"{"query":"rust"}"#.into(),
            }],
        );

        let refs: Vec<&Message> = vec![&msg];
        let api_msgs = AnthropicAdapter::to_api_messages(&refs);
        assert_eq!(api_msgs.len(), 1);
        assert_eq!(api_msgs[0].role, "assistant");

        match &api_msgs[0].content {
            AnthropicContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2); // text + tool_use
                match &blocks[1] {
                    ContentBlock::ToolUse { id, name, .. } => {
                        assert_eq!(id, "toolu_123");
                        assert_eq!(name, "web_search");
                    }
                    _ => panic!("Expected tool_use block"),
                }
            }
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn message_conversion_tool_result() {
        let msg = Message::tool_result("toolu_123", "search results here");
        let refs: Vec<&Message> = vec![&msg];
        let api_msgs = AnthropicAdapter::to_api_messages(&refs);
        assert_eq!(api_msgs.len(), 1);
        assert_eq!(api_msgs[0].role, "user"); // Tool results go as user messages

        match &api_msgs[0].content {
            AnthropicContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                } => {
                    assert_eq!(tool_use_id, "toolu_123");
                    assert_eq!(content, "search results here");
                }
                _ => panic!("Expected tool_result block"),
            },
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn message_conversion_with_image() {
        let msg = Message::user_parts(vec![
            ContentPart::Text {
                text: "describe".into(),
            },
            ContentPart::Image {
                source: ImageSource::Inline {
                    media_type: "image/jpeg".into(),
                    data: "QUJD".into(),
                },
                detail: Some(ImageDetail::Auto),
                dimensions: None,
            },
        ]);
        let refs: Vec<&Message> = vec![&msg];
        let api_msgs = AnthropicAdapter::to_api_messages(&refs);
        match &api_msgs[0].content {
            AnthropicContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                match &blocks[1] {
                    ContentBlock::Image { source } => {
                        assert_eq!(source["type"], "base64");
                        assert_eq!(source["media_type"], "image/jpeg");
                    }
                    _ => panic!("Expected image block"),
                }
            }
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "calculator".into(),
            description: "Evaluate math".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "expression": {"type": "string"}
                },
                "required": ["expression"]
            }),
        }];
        let api_tools = AnthropicAdapter::to_api_tools(&tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].name, "calculator");
        assert_eq!(api_tools[0].input_schema["type"].as_str(), Some("object"));
    }

    #[test]
    fn parse_text_response() {
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "id": "msg_01",
                "model": "claude-sonnet-4",
                "content": [{"type": "text", "text": "Hello!"}],
                "usage": {"input_tokens": 10, "output_tokens": 5},
                "stop_reason": "end_turn"
            }"#,
        )
        .unwrap();

        let pr = AnthropicAdapter::response_to_provider_response(resp).unwrap();
        assert_eq!(pr.message.text(), "Hello!");
        assert!(pr.message.tool_calls.is_empty());
        assert_eq!(pr.usage.unwrap().total_tokens, 15);
        assert_eq!(pr.model, "claude-sonnet-4");
    }

    #[test]
    fn parse_tool_use_response() {
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "id": "msg_02",
                "model": "claude-sonnet-4",
                "content": [
                    {"type": "text", "text": "Let me calculate"},
                    {"type": "tool_use", "id": "toolu_abc", "name": "calculator", "input": {"expression": "2+2"}}
                ],
                "usage": {"input_tokens": 20, "output_tokens": 10},
                "stop_reason": "tool_use"
            }"#,
        )
        .unwrap();

        let pr = AnthropicAdapter::response_to_provider_response(resp).unwrap();
        assert_eq!(pr.message.text(), "Let me calculate");
        assert_eq!(pr.message.tool_calls.len(), 1);
        assert_eq!(pr.message.tool_calls[0].name, "calculator");
        let args: serde_json::Value =
            serde_json::from_str(&pr.message.tool_calls[0].arguments).unwrap();
        assert_eq!(args["expression"], "2+2");
    }

    #[test]
    fn anthropic_content_serialization() {
        let msg = AnthropicMessage {
            role: "user".into(),
            content: AnthropicContent::Text("Hello".into()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"Hello\""));

        let msg2 = AnthropicMessage {
            role: "assistant".into(),
            content: AnthropicContent::Blocks(vec![ContentBlock::Text { text: "Hi".into() }]),
        };
        let json2 = serde_json::to_string(&msg2).unwrap();
        assert!(json2.contains("\"type\":\"text\""));
    }

    #[test]
    fn status_error_mapping() {
        assert!(matches!(
            AnthropicAdapter::status_error(429, String::new()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            AnthropicAdapter::status_error(403, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
    }
}
