//! # chatloom Providers
//!
//! Backend adapters for the chatloom inference orchestration core. Each
//! adapter translates canonical messages into one backend family's request
//! shape, consumes that backend's native stream, and re-emits it as
//! canonical [`ResponseChunk`](chatloom_core::chunk::ResponseChunk) values
//! — backend wire formats never leak past this crate.

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai_compat;
pub mod reasoning;
pub mod registry;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use ollama::OllamaAdapter;
pub use openai_compat::OpenAiCompatAdapter;
pub use reasoning::{Extracted, ReasoningExtractor};
pub use registry::{ProviderClient, ProviderRegistry};
