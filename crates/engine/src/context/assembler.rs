//! Context assembly — turning accumulated conversation state into a
//! bounded prompt.
//!
//! The assembler reserves budget for the system prompt, any injected tool
//! instructions, and the current user turn (file excerpts and images
//! included), then walks prior turns from most recent to oldest, adding
//! each whole turn only while the running total stays within budget. Older
//! turns are dropped, never truncated. Consecutive same-role messages are
//! merged before dispatch because some backends reject consecutive
//! same-role turns.
//!
//! # Determinism
//!
//! Assembly is deterministic: identical inputs always produce identical
//! outputs. No random or time-dependent logic is used.

use crate::context::token::{self, ImageCostFn};
use chatloom_core::message::{ContentPart, Message, MessageContent, Role};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// All inputs required for assembling one prompt.
pub struct AssemblyInput<'a> {
    /// The system prompt. Never trimmed.
    pub system_prompt: &'a str,
    /// Extra instructions injected below the system prompt (tool usage
    /// guidance, artifact rules). Never trimmed.
    pub tool_instructions: Option<&'a str>,
    /// Prior conversation turns, oldest first.
    pub history: &'a [Message],
    /// The current user turn, including attached file excerpts and images.
    pub current_turn: Message,
}

/// The assembled prompt, ready for a provider request.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    /// System message followed by the included history window and the
    /// current turn, same-role runs merged.
    pub messages: Vec<Message>,
    /// Assembly statistics.
    pub metadata: AssemblyMetadata,
}

/// Statistics about the assembly process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Total estimated tokens in the assembled prompt.
    pub total_tokens: usize,
    /// The configured budget.
    pub budget: usize,
    /// Prior turns included.
    pub included_turns: usize,
    /// Prior turns dropped for budget.
    pub dropped_turns: usize,
}

/// The context assembler. Stateless — create one and reuse it.
pub struct ContextAssembler {
    budget: usize,
    image_cost: ImageCostFn,
}

impl ContextAssembler {
    /// Create an assembler with the given token budget (the model's context
    /// length minus whatever the caller reserves for output).
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            image_cost: token::default_image_tokens,
        }
    }

    /// Derive the budget from a catalog entry: the model's context window
    /// minus its output-token reservation.
    pub fn for_model(model: &chatloom_config::ModelInfo) -> Self {
        Self::new(
            model
                .context_length
                .saturating_sub(model.max_output_tokens as usize),
        )
    }

    /// Override image token pricing for a specific backend.
    pub fn with_image_cost(mut self, image_cost: ImageCostFn) -> Self {
        self.image_cost = image_cost;
        self
    }

    /// Assemble a bounded prompt.
    ///
    /// Never fails: when the reserved set alone exceeds the budget, the
    /// result simply contains zero prior turns.
    pub fn assemble(&self, input: AssemblyInput<'_>) -> AssembledPrompt {
        let system_text = match input.tool_instructions {
            Some(instructions) if !instructions.is_empty() => {
                format!("{}\n\n{}", input.system_prompt, instructions)
            }
            _ => input.system_prompt.to_string(),
        };
        let system = Message::system(system_text);

        let reserved = token::estimate_message_tokens(&system, self.image_cost)
            + token::estimate_message_tokens(&input.current_turn, self.image_cost);

        // Walk prior turns newest → oldest; stop at the first overflow.
        let mut included_rev: Vec<&Message> = Vec::new();
        let mut used = reserved;
        let mut dropped = 0;
        for msg in input.history.iter().rev() {
            if dropped > 0 {
                dropped += 1;
                continue;
            }
            let cost = token::estimate_message_tokens(msg, self.image_cost);
            if used + cost > self.budget {
                dropped += 1;
                continue;
            }
            used += cost;
            included_rev.push(msg);
        }

        let included_turns = included_rev.len();
        if dropped > 0 {
            debug!(
                included = included_turns,
                dropped, budget = self.budget, "History trimmed to fit budget"
            );
        }

        let mut messages = Vec::with_capacity(included_turns + 2);
        messages.push(system);
        messages.extend(included_rev.into_iter().rev().cloned());
        messages.push(input.current_turn);

        let messages = merge_same_role(messages);
        let total_tokens = token::estimate_messages_tokens(&messages, self.image_cost);

        AssembledPrompt {
            messages,
            metadata: AssemblyMetadata {
                total_tokens,
                budget: self.budget,
                included_turns,
                dropped_turns: dropped,
            },
        }
    }
}

/// Merge consecutive same-role messages into one, newline-joining text.
/// Part lists are concatenated with text parts kept in order.
fn merge_same_role(messages: Vec<Message>) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(messages.len());

    for msg in messages {
        match merged.last_mut() {
            Some(last) if last.role == msg.role && msg.role != Role::Tool => {
                last.content = merge_content(&last.content, &msg.content);
                last.tool_calls.extend(msg.tool_calls);
            }
            _ => merged.push(msg),
        }
    }

    merged
}

fn merge_content(a: &MessageContent, b: &MessageContent) -> MessageContent {
    match (a, b) {
        (MessageContent::Text(left), MessageContent::Text(right)) => {
            if left.is_empty() {
                MessageContent::Text(right.clone())
            } else if right.is_empty() {
                MessageContent::Text(left.clone())
            } else {
                MessageContent::Text(format!("{left}\n{right}"))
            }
        }
        _ => {
            let mut parts = to_parts(a);
            parts.extend(to_parts(b));
            MessageContent::Parts(parts)
        }
    }
}

fn to_parts(content: &MessageContent) -> Vec<ContentPart> {
    match content {
        MessageContent::Text(text) => {
            if text.is_empty() {
                Vec::new()
            } else {
                vec![ContentPart::Text { text: text.clone() }]
            }
        }
        MessageContent::Parts(parts) => parts.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatloom_core::message::ImageSource;

    fn turn(role: Role, text: &str) -> Message {
        match role {
            Role::User => Message::user(text),
            Role::Assistant => Message::assistant(text),
            Role::System => Message::system(text),
            Role::Tool => Message::tool_result("call", text),
        }
    }

    #[test]
    fn includes_everything_under_generous_budget() {
        let history = vec![
            turn(Role::User, "first question"),
            turn(Role::Assistant, "first answer"),
        ];
        let assembler = ContextAssembler::new(10_000);
        let prompt = assembler.assemble(AssemblyInput {
            system_prompt: "You are helpful.",
            tool_instructions: None,
            history: &history,
            current_turn: Message::user("second question"),
        });

        // system + 2 history + current
        assert_eq!(prompt.messages.len(), 4);
        assert_eq!(prompt.metadata.included_turns, 2);
        assert_eq!(prompt.metadata.dropped_turns, 0);
        assert_eq!(prompt.messages[0].role, Role::System);
        assert_eq!(prompt.messages[3].text(), "second question");
    }

    #[test]
    fn drops_oldest_turns_first() {
        let old = "x".repeat(400); // ~104 tokens
        let history = vec![
            turn(Role::User, &old),
            turn(Role::Assistant, "recent answer"),
            turn(Role::User, "recent question"),
        ];
        // Enough for system + current + the two recent turns, not the old one
        let assembler = ContextAssembler::new(60);
        let prompt = assembler.assemble(AssemblyInput {
            system_prompt: "sys",
            tool_instructions: None,
            history: &history,
            current_turn: Message::user("now"),
        });

        assert_eq!(prompt.metadata.included_turns, 2);
        assert_eq!(prompt.metadata.dropped_turns, 1);
        let texts: Vec<String> = prompt.messages.iter().map(|m| m.text()).collect();
        assert!(!texts.iter().any(|t| t.contains("xxxx")));
        assert!(texts.iter().any(|t| t == "recent answer"));
    }

    #[test]
    fn stops_at_first_overflowing_turn() {
        let big = "y".repeat(1000);
        let history = vec![
            turn(Role::User, "tiny old"),
            turn(Role::Assistant, &big), // overflows
            turn(Role::User, "tiny recent"),
        ];
        let assembler = ContextAssembler::new(40);
        let prompt = assembler.assemble(AssemblyInput {
            system_prompt: "sys",
            tool_instructions: None,
            history: &history,
            current_turn: Message::user("now"),
        });

        // "tiny old" would fit, but the walk stops at the first overflow.
        assert_eq!(prompt.metadata.included_turns, 1);
        assert_eq!(prompt.metadata.dropped_turns, 2);
        assert!(prompt.messages.iter().any(|m| m.text() == "tiny recent"));
        assert!(!prompt.messages.iter().any(|m| m.text() == "tiny old"));
    }

    #[test]
    fn budget_smaller_than_reserved_yields_zero_history() {
        let history = vec![turn(Role::User, "anything")];
        let assembler = ContextAssembler::new(1);
        let prompt = assembler.assemble(AssemblyInput {
            system_prompt: "a very long system prompt that blows the budget on its own",
            tool_instructions: None,
            history: &history,
            current_turn: Message::user("current"),
        });

        assert_eq!(prompt.metadata.included_turns, 0);
        assert_eq!(prompt.metadata.dropped_turns, 1);
        // system + current always present
        assert_eq!(prompt.messages.len(), 2);
    }

    #[test]
    fn tool_instructions_join_system_prompt() {
        let assembler = ContextAssembler::new(10_000);
        let prompt = assembler.assemble(AssemblyInput {
            system_prompt: "Base.",
            tool_instructions: Some("Use tools wisely."),
            history: &[],
            current_turn: Message::user("hi"),
        });
        assert_eq!(prompt.messages[0].text(), "Base.\n\nUse tools wisely.");
    }

    #[test]
    fn consecutive_same_role_turns_merge() {
        let history = vec![
            turn(Role::User, "part one"),
            turn(Role::User, "part two"),
            turn(Role::Assistant, "answer"),
        ];
        let assembler = ContextAssembler::new(10_000);
        let prompt = assembler.assemble(AssemblyInput {
            system_prompt: "sys",
            tool_instructions: None,
            history: &history,
            current_turn: Message::user("next"),
        });

        // system, merged user, assistant, current user
        assert_eq!(prompt.messages.len(), 4);
        assert_eq!(prompt.messages[1].text(), "part one\npart two");
    }

    #[test]
    fn current_turn_merges_into_trailing_user_run() {
        let history = vec![turn(Role::User, "earlier")];
        let assembler = ContextAssembler::new(10_000);
        let prompt = assembler.assemble(AssemblyInput {
            system_prompt: "sys",
            tool_instructions: None,
            history: &history,
            current_turn: Message::user("now"),
        });
        assert_eq!(prompt.messages.len(), 2);
        assert_eq!(prompt.messages[1].text(), "earlier\nnow");
    }

    #[test]
    fn merging_preserves_image_parts() {
        let history = vec![Message::user_parts(vec![ContentPart::Image {
            source: ImageSource::Url {
                url: "https://example.com/a.png".into(),
            },
            detail: None,
            dimensions: Some((75, 10)), // 1 token
        }])];
        let assembler = ContextAssembler::new(10_000);
        let prompt = assembler.assemble(AssemblyInput {
            system_prompt: "sys",
            tool_instructions: None,
            history: &history,
            current_turn: Message::user("and this text"),
        });

        assert_eq!(prompt.messages.len(), 2);
        match &prompt.messages[1].content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[0], ContentPart::Image { .. }));
                assert!(matches!(parts[1], ContentPart::Text { .. }));
            }
            _ => panic!("Expected parts content"),
        }
    }

    #[test]
    fn images_count_against_budget() {
        let heavy_image = Message::user_parts(vec![ContentPart::Image {
            source: ImageSource::Url {
                url: "https://example.com/big.png".into(),
            },
            detail: None,
            dimensions: Some((3000, 2000)), // 8000 tokens
        }]);
        let history = vec![heavy_image, turn(Role::Assistant, "described")];
        let assembler = ContextAssembler::new(100);
        let prompt = assembler.assemble(AssemblyInput {
            system_prompt: "sys",
            tool_instructions: None,
            history: &history,
            current_turn: Message::user("next"),
        });

        // The image turn overflows; the walk stops there.
        assert_eq!(prompt.metadata.included_turns, 1);
        assert_eq!(prompt.metadata.dropped_turns, 1);
    }

    #[test]
    fn budget_derived_from_model_limits() {
        let model = chatloom_config::ModelInfo {
            id: "gpt-4o".into(),
            context_length: 128_000,
            max_output_tokens: 16_384,
        };
        let assembler = ContextAssembler::for_model(&model);
        assert_eq!(assembler.budget, 111_616);
    }

    #[test]
    fn deterministic_output() {
        let history = vec![
            turn(Role::User, "q1"),
            turn(Role::Assistant, "a1"),
            turn(Role::User, "q2"),
        ];
        let assembler = ContextAssembler::new(500);
        let a = assembler.assemble(AssemblyInput {
            system_prompt: "sys",
            tool_instructions: None,
            history: &history,
            current_turn: Message::user("now"),
        });
        let b = assembler.assemble(AssemblyInput {
            system_prompt: "sys",
            tool_instructions: None,
            history: &history,
            current_turn: Message::user("now"),
        });
        let texts = |p: &AssembledPrompt| -> Vec<String> {
            p.messages.iter().map(|m| m.text()).collect()
        };
        assert_eq!(texts(&a), texts(&b));
        assert_eq!(a.metadata.total_tokens, b.metadata.total_tokens);
    }
}
