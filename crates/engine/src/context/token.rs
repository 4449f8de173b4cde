//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. This
//! approximation is accurate within ~10% for BPE tokenizers on English
//! text. Images are priced by pixel area rather than true backend
//! tokenization — a documented approximation, pluggable per backend.

use chatloom_core::message::{ContentPart, Message, MessageContent};
use chatloom_core::tool::ToolDefinition;

/// Tokens charged per image when its dimensions are unknown.
const UNKNOWN_IMAGE_TOKENS: usize = 256;

/// Pixel area covered by one token in the default image heuristic.
const PIXELS_PER_TOKEN: u32 = 750;

/// Pluggable image cost function: pixel dimensions (when known) → tokens.
pub type ImageCostFn = fn(Option<(u32, u32)>) -> usize;

/// Default image pricing: area / 750, flat fallback without dimensions.
pub fn default_image_tokens(dimensions: Option<(u32, u32)>) -> usize {
    match dimensions {
        Some((w, h)) => (((w as u64 * h as u64) / PIXELS_PER_TOKEN as u64) as usize).max(1),
        None => UNKNOWN_IMAGE_TOKENS,
    }
}

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead.
///
/// Each message costs ~4 tokens of overhead for role name, delimiters, and
/// formatting markers in the API wire format. Image parts are priced by the
/// given cost function.
pub fn estimate_message_tokens(message: &Message, image_cost: ImageCostFn) -> usize {
    let overhead = 4;
    let content_tokens = match &message.content {
        MessageContent::Text(text) => estimate_tokens(text),
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => estimate_tokens(text),
                ContentPart::Image { dimensions, .. } => image_cost(*dimensions),
            })
            .sum(),
    };
    overhead + content_tokens
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message], image_cost: ImageCostFn) -> usize {
    messages
        .iter()
        .map(|m| estimate_message_tokens(m, image_cost))
        .sum()
}

/// Estimate tokens for a tool definition (serialized as JSON).
pub fn estimate_tool_tokens(tool: &ToolDefinition) -> usize {
    let json = serde_json::to_string(tool).unwrap_or_default();
    estimate_tokens(&json)
}
