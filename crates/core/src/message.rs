//! Chat message domain types.
//!
//! These are the core value objects that flow through the entire system:
//! the context assembler builds a message list → the orchestrator dispatches
//! it → a provider adapter translates it into its backend's wire shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (identity, rules)
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Tool execution result, re-injected by the tool-call loop
    Tool,
}

/// Message content: plain text or an ordered sequence of parts.
///
/// Backends with vision support receive the parts form; text-only backends
/// get the flattened text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Flatten to plain text. Image parts are skipped; text parts are
    /// newline-joined.
    pub fn flatten_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Whether any part is an image reference.
    pub fn has_images(&self) -> bool {
        match self {
            Self::Text(_) => false,
            Self::Parts(parts) => parts
                .iter()
                .any(|p| matches!(p, ContentPart::Image { .. })),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// One part of a multi-part message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
        /// Resolution hint for backends that accept one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<ImageDetail>,
        /// Pixel dimensions when known; used by the context assembler's
        /// area-based token pricing.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dimensions: Option<(u32, u32)>,
    },
}

/// Where the image bytes live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    /// Base64-encoded bytes carried inline.
    Inline { media_type: String, data: String },
    /// A fetchable URL.
    Url { url: String },
}

/// Image detail hint, as accepted by OpenAI-style backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    Auto,
}

/// A single message in a conversation.
///
/// Immutable once constructed — edits produce a new message rather than
/// mutating in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The content (plain text or parts)
    pub content: MessageContent,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn build(role: Role, content: MessageContent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::build(Role::User, MessageContent::Text(content.into()))
    }

    /// Create a user message from content parts (text + images).
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self::build(Role::User, MessageContent::Parts(parts))
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::build(Role::Assistant, MessageContent::Text(content.into()))
    }

    /// Create an assistant message that carries tool call requests.
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<MessageToolCall>,
    ) -> Self {
        let mut msg = Self::assistant(content);
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::build(Role::System, MessageContent::Text(content.into()))
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::build(Role::Tool, MessageContent::Text(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// The flattened text content.
    pub fn text(&self) -> String {
        self.content.flatten_text()
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Provider-local call ID
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a raw JSON string
    pub arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Hello!");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn tool_result_carries_call_id() {
        let msg = Message::tool_result("call_1", "output");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn empty_assistant_message_is_valid() {
        // Streaming accumulates into an initially empty assistant message.
        let msg = Message::assistant("");
        assert!(msg.content.is_empty());
    }

    #[test]
    fn parts_flatten_skips_images() {
        let msg = Message::user_parts(vec![
            ContentPart::Text {
                text: "look at this".into(),
            },
            ContentPart::Image {
                source: ImageSource::Url {
                    url: "https://example.com/cat.png".into(),
                },
                detail: Some(ImageDetail::Low),
                dimensions: Some((640, 480)),
            },
            ContentPart::Text {
                text: "what is it?".into(),
            },
        ]);
        assert_eq!(msg.text(), "look at this\nwhat is it?");
        assert!(msg.content.has_images());
    }

    #[test]
    fn content_serialization_roundtrip() {
        let msg = Message::user_parts(vec![
            ContentPart::Text { text: "hi".into() },
            ContentPart::Image {
                source: ImageSource::Inline {
                    media_type: "image/png".into(),
                    data: "aGVsbG8=".into(),
                },
                detail: None,
                dimensions: None,
            },
        ]);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        match back.content {
            MessageContent::Parts(parts) => assert_eq!(parts.len(), 2),
            _ => panic!("Expected parts content"),
        }
    }

    #[test]
    fn plain_text_serializes_as_string() {
        let msg = Message::user("Test message");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"], serde_json::json!("Test message"));
        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back.text(), "Test message");
    }
}
