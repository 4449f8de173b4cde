//! The canonical streaming unit.
//!
//! Every provider adapter normalizes its backend's native stream into
//! [`ResponseChunk`] values at the adapter boundary — backend delta shapes
//! never leak past it. A chunk may carry zero or more fields; an empty
//! chunk is valid and ignorable.

use crate::message::MessageToolCall;
use serde::{Deserialize, Serialize};

/// Cumulative token usage, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Lifecycle phase of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallPhase {
    /// Emitted before execution, with name + raw arguments.
    Start,
    /// Emitted after successful execution, with the textual result.
    End,
    /// Emitted when the invocation failed.
    Error,
}

/// Identity of the tool server that owns an invoked tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A tool invocation lifecycle event carried on a chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub phase: ToolCallPhase,
    pub name: String,
    /// Raw JSON argument string as the backend emitted it.
    pub arguments: String,
    /// Textual result (End) or error description (Error).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ToolServerInfo>,
}

/// Identity of a tool call that was requested but never executed because
/// the loop's invocation ceiling was reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingToolCall {
    pub name: String,
    pub arguments: String,
}

/// An inline image payload emitted by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineImage {
    pub media_type: String,
    /// Base64-encoded bytes.
    pub data: String,
}

/// The canonical unit emitted by a provider adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseChunk {
    /// Visible content delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Reasoning ("thinking") content delta, separated either by the
    /// tag-extraction filter or by a backend-native structured field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Tool invocation lifecycle event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallEvent>,

    /// Inline image payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<InlineImage>,

    /// Cumulative usage snapshot (the latest one wins).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Terminal marker: the invocation ceiling was reached and this call
    /// was not executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_limit: Option<PendingToolCall>,

    /// Tool calls the model requested this pass, assembled from the
    /// backend's incremental fragments. Set on the adapter's final chunk
    /// and consumed by the tool-call loop; not forwarded to subscribers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Whether this is the final chunk of the adapter pass.
    #[serde(default)]
    pub done: bool,
}

impl ResponseChunk {
    /// A chunk carrying only a content delta.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    /// A chunk carrying only a reasoning delta.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning: Some(text.into()),
            ..Self::default()
        }
    }

    /// A chunk carrying only a tool lifecycle event.
    pub fn tool_event(event: ToolCallEvent) -> Self {
        Self {
            tool_call: Some(event),
            ..Self::default()
        }
    }

    /// The terminal chunk of an adapter pass.
    pub fn done() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }

    /// True when the chunk carries nothing at all.
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.reasoning.is_none()
            && self.tool_call.is_none()
            && self.image.is_none()
            && self.usage.is_none()
            && self.tool_limit.is_none()
            && self.tool_calls.is_empty()
            && !self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chunk_is_empty() {
        assert!(ResponseChunk::default().is_empty());
    }

    #[test]
    fn content_chunk_is_not_empty() {
        assert!(!ResponseChunk::content("hi").is_empty());
        assert!(!ResponseChunk::done().is_empty());
    }

    #[test]
    fn serialization_skips_absent_fields() {
        let json = serde_json::to_string(&ResponseChunk::content("hi")).unwrap();
        assert!(json.contains("content"));
        assert!(!json.contains("reasoning"));
        assert!(!json.contains("tool_call"));
    }

    #[test]
    fn tool_event_roundtrip() {
        let chunk = ResponseChunk::tool_event(ToolCallEvent {
            phase: ToolCallPhase::End,
            name: "web_search".into(),
            arguments: r#"{"query":"rust"}"#.into(),
            result: Some("three results".into()),
            server: Some(ToolServerInfo {
                name: "search".into(),
                description: Some("Web search server".into()),
            }),
        });
        let json = serde_json::to_string(&chunk).unwrap();
        let back: ResponseChunk = serde_json::from_str(&json).unwrap();
        let event = back.tool_call.unwrap();
        assert_eq!(event.phase, ToolCallPhase::End);
        assert_eq!(event.name, "web_search");
        assert_eq!(event.result.as_deref(), Some("three results"));
    }

    #[test]
    fn tool_limit_marker() {
        let chunk = ResponseChunk {
            tool_limit: Some(PendingToolCall {
                name: "calculator".into(),
                arguments: "{}".into(),
            }),
            done: true,
            ..ResponseChunk::default()
        };
        assert!(!chunk.is_empty());
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains("calculator"));
    }
}
