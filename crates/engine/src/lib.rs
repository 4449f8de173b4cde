//! # chatloom Engine
//!
//! The orchestration layer of chatloom: the session registry with its
//! concurrency ceiling and cooperative cancellation, the bounded tool-call
//! loop, and the token-budgeted context assembler. Everything here speaks
//! canonical types from `chatloom-core`; backend wire formats stay inside
//! `chatloom-providers`.

pub mod context;
pub mod orchestrator;
pub mod tool_loop;

pub use context::{AssembledPrompt, AssemblyInput, ContextAssembler};
pub use orchestrator::{ProviderResolver, SessionInfo, StreamOrchestrator};
pub use tool_loop::{GenerationParams, ToolCallLoop};
