//! Google Gemini backend adapter.
//!
//! Uses the generative language REST API:
//! - `x-goog-api-key` header authentication
//! - `systemInstruction` as a top-level field
//! - `contents[].parts[]` with user/model roles
//! - Tool calling via `functionCall` / `functionResponse` parts
//! - Streaming via `streamGenerateContent?alt=sse`
//! - Thought parts surfaced as reasoning chunks

use crate::reasoning::ReasoningExtractor;
use async_trait::async_trait;
use chatloom_core::chunk::{InlineImage, ResponseChunk, Usage};
use chatloom_core::error::ProviderError;
use chatloom_core::message::{
    ContentPart, ImageSource, Message, MessageContent, MessageToolCall, Role,
};
use chatloom_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse};
use chatloom_core::tool::ToolDefinition;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, trace, warn};

/// Google Gemini generateContent API adapter.
pub struct GeminiAdapter {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiAdapter {
    /// Create a new Gemini adapter.
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

    /// Gemini has no tool-call ids; ours are synthesized as `{name}-{n}` so
    /// the function name can be recovered when translating the tool result.
    fn call_name_from_id(id: &str) -> &str {
        match id.rsplit_once('-') {
            Some((name, suffix)) if suffix.parse::<u32>().is_ok() => name,
            _ => id,
        }
    }

    /// Extract system messages; Gemini takes them as `systemInstruction`.
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

    /// Render canonical content into Gemini parts.
    fn content_parts(content: &MessageContent) -> Vec<serde_json::Value> {
        match content {
            MessageContent::Text(text) => vec![serde_json::json!({ "text": text })],
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => serde_json::json!({ "text": text }),
                    ContentPart::Image { source, .. } => match source {
                        ImageSource::Inline { media_type, data } => serde_json::json!({
                            "inlineData": { "mimeType": media_type, "data": data }
                        }),
                        ImageSource::Url { url } => serde_json::json!({
                            "fileData": { "fileUri": url }
                        }),
                    },
                })
                .collect(),
        }
    }

    /// Convert messages to Gemini `contents` entries.
    fn to_api_contents(messages: &[&Message]) -> Vec<serde_json::Value> {
        let mut contents = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User => contents.push(serde_json::json!({
                    "role": "user",
                    "parts": Self::content_parts(&msg.content),
                })),
                Role::Assistant => {
                    let mut parts = Vec::new();
                    let text = msg.text();
                    if !text.is_empty() {
                        parts.push(serde_json::json!({ "text": text }));
                    }
                    for tc in &msg.tool_calls {
                        let args: serde_json::Value =
                            serde_json::from_str(&tc.arguments).unwrap_or_default();
                        parts.push(serde_json::json!({
                            "functionCall": { "name": tc.name, "args": args }
                        }));
                    }
                    contents.push(serde_json::json!({ "role": "model", "parts": parts }));
                }
                Role::Tool => {
                    let name = msg
                        .tool_call_id
                        .as_deref()
                        .map(Self::call_name_from_id)
                        .unwrap_or_default();
                    contents.push(serde_json::json!({
                        "role": "user",
                        "parts": [{
                            "functionResponse": {
                                "name": name,
                                "response": { "result": msg.text() }
                            }
                        }]
                    }));
                }
                Role::System => {} // handled separately
            }
        }

        contents
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> serde_json::Value {
        let declarations: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();
        serde_json::json!([{ "functionDeclarations": declarations }])
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let (system, messages) = Self::extract_system(&request.messages);

        let mut generation_config = serde_json::json!({
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_tokens {
            generation_config["maxOutputTokens"] = serde_json::json!(max_tokens);
        }

        let mut body = serde_json::json!({
            "contents": Self::to_api_contents(&messages),
            "generationConfig": generation_config,
        });
        if let Some(ref sys) = system {
            body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": sys }] });
        }
        if !request.tools.is_empty() {
            body["tools"] = Self::to_api_tools(&request.tools);
        }
        body
    }

    fn status_error(status: u16, body: String) -> ProviderError {
        match status {
            429 => ProviderError::RateLimited {
                retry_after_secs: 5,
            },
            401 | 403 => ProviderError::AuthenticationFailed("Invalid Google API key".into()),
            404 => ProviderError::ModelNotFound(body),
            _ => ProviderError::ApiError {
                status_code: status,
                message: body,
            },
        }
    }
}

#[async_trait]
impl Provider for GeminiAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, request.model
        );
        let body = Self::request_body(&request);

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini API error");
            return Err(Self::status_error(status, error_body));
        }

        let api_resp: GenerateContentResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Gemini response: {e}"),
            })?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for candidate in &api_resp.candidates {
            let Some(content) = &candidate.content else {
                continue;
            };
            for part in &content.parts {
                if let Some(part_text) = &part.text {
                    if !part.thought {
                        text.push_str(part_text);
                    }
                }
                if let Some(fc) = &part.function_call {
                    let id = format!("{}-{}", fc.name, tool_calls.len());
                    tool_calls.push(MessageToolCall {
                        id,
                        name: fc.name.clone(),
                        arguments: fc.args.to_string(),
                    });
                }
            }
        }

        let usage = api_resp.usage_metadata.map(UsageMetadata::to_usage);

        Ok(ProviderResponse {
            message: Message::assistant_with_tool_calls(text, tool_calls),
            usage,
            model: request.model,
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, request.model
        );
        let body = Self::request_body(&request);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
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
                    if data.is_empty() {
                        continue;
                    }

                    let resp = match serde_json::from_str::<GenerateContentResponse>(data) {
                        Ok(r) => r,
                        Err(e) => {
                            trace!(
                                provider = %provider_name,
                                data = %data,
                                error = %e,
                                "Ignoring unparseable Gemini SSE chunk"
                            );
                            continue;
                        }
                    };

                    if let Some(meta) = resp.usage_metadata {
                        usage = Some(meta.to_usage());
                    }

                    for candidate in &resp.candidates {
                        let Some(content) = &candidate.content else {
                            continue;
                        };
                        for part in &content.parts {
                            if let Some(text) = &part.text {
                                // Thought parts are structurally separated
                                // reasoning — they bypass the filter.
                                let chunk = if part.thought {
                                    ResponseChunk::reasoning(text.clone())
                                } else {
                                    let split = extractor.push(text);
                                    ResponseChunk {
                                        content: split.content,
                                        reasoning: split.reasoning,
                                        ..ResponseChunk::default()
                                    }
                                };
                                if !chunk.is_empty() && tx.send(Ok(chunk)).await.is_err() {
                                    return;
                                }
                            }
                            if let Some(fc) = &part.function_call {
                                let id = format!("{}-{}", fc.name, tool_calls.len());
                                tool_calls.push(MessageToolCall {
                                    id,
                                    name: fc.name.clone(),
                                    arguments: fc.args.to_string(),
                                });
                            }
                            if let Some(inline) = &part.inline_data {
                                let chunk = ResponseChunk {
                                    image: Some(InlineImage {
                                        media_type: inline.mime_type.clone(),
                                        data: inline.data.clone(),
                                    }),
                                    ..ResponseChunk::default()
                                };
                                if tx.send(Ok(chunk)).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }

            // The stream simply ends after the final candidate.
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
        let url = format!("{}/v1beta/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
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
                        .map(|name| name.split('/').next_back().unwrap_or(name) == model)
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);

        Ok(listed)
    }
}

// --- Gemini API response types ---

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    #[serde(rename = "functionCall")]
    function_call: Option<FunctionCall>,
    #[serde(rename = "inlineData")]
    inline_data: Option<InlinePartData>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct InlinePartData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u32,
}

impl UsageMetadata {
    fn to_usage(self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_token_count,
            completion_tokens: self.candidates_token_count,
            total_tokens: self.total_token_count,
        }
    }
}
