//! # chatloom Core
//!
//! Domain types, traits, and error definitions for the chatloom inference
//! orchestration core. This crate has **zero framework dependencies** — it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping backends via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod chunk;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use chunk::{
    InlineImage, PendingToolCall, ResponseChunk, ToolCallEvent, ToolCallPhase, ToolServerInfo,
    Usage,
};
pub use error::{Error, OrchestratorError, ProviderError, Result, ToolError};
pub use message::{
    ContentPart, ImageDetail, ImageSource, Message, MessageContent, MessageToolCall, Role,
};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse};
pub use tool::{ToolDefinition, ToolExecutor, ToolInvocation, ToolResult};
