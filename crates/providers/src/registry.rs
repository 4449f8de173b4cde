//! Provider registry — builds and caches one adapter per configured backend.
//!
//! Backends form a closed set of tagged variants, one per wire dialect.
//! The registry constructs the right variant from a descriptor exactly once
//! per provider id and hands out shared references; no runtime type
//! inspection is ever needed.

use crate::anthropic::AnthropicAdapter;
use crate::gemini::GeminiAdapter;
use crate::ollama::OllamaAdapter;
use crate::openai_compat::OpenAiCompatAdapter;
use async_trait::async_trait;
use chatloom_config::{ConfigError, LoomConfig, ProviderDescriptor, ProviderKind};
use chatloom_core::error::ProviderError;
use chatloom_core::message::Message;
use chatloom_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One adapter per backend family — the closed set.
pub enum ProviderClient {
    OpenaiCompat(OpenAiCompatAdapter),
    Anthropic(AnthropicAdapter),
    Gemini(GeminiAdapter),
    Ollama(OllamaAdapter),
}

impl ProviderClient {
    /// Build the adapter variant for a descriptor. Missing credentials fail
    /// fast here, before any network call.
    pub fn from_descriptor(descriptor: &ProviderDescriptor) -> Result<Self, ConfigError> {
        let api_key = descriptor.api_key.clone().unwrap_or_default();
        if descriptor.kind.requires_api_key() && api_key.is_empty() {
            return Err(ConfigError::MissingCredential {
                provider: descriptor.id.clone(),
            });
        }
        let endpoint = descriptor.endpoint();

        Ok(match descriptor.kind {
            ProviderKind::OpenaiCompat => {
                Self::OpenaiCompat(OpenAiCompatAdapter::new(&descriptor.id, endpoint, api_key))
            }
            ProviderKind::Anthropic => {
                Self::Anthropic(AnthropicAdapter::new(&descriptor.id, endpoint, api_key))
            }
            ProviderKind::Gemini => {
                Self::Gemini(GeminiAdapter::new(&descriptor.id, endpoint, api_key))
            }
            ProviderKind::Ollama => Self::Ollama(OllamaAdapter::new(&descriptor.id, endpoint)),
        })
    }
}

#[async_trait]
impl Provider for ProviderClient {
    fn name(&self) -> &str {
        match self {
            Self::OpenaiCompat(p) => p.name(),
            Self::Anthropic(p) => p.name(),
            Self::Gemini(p) => p.name(),
            Self::Ollama(p) => p.name(),
        }
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        match self {
            Self::OpenaiCompat(p) => p.complete(request).await,
            Self::Anthropic(p) => p.complete(request).await,
            Self::Gemini(p) => p.complete(request).await,
            Self::Ollama(p) => p.complete(request).await,
        }
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        match self {
            Self::OpenaiCompat(p) => p.stream(request).await,
            Self::Anthropic(p) => p.stream(request).await,
            Self::Gemini(p) => p.stream(request).await,
            Self::Ollama(p) => p.stream(request).await,
        }
    }

    async fn summarize_title(
        &self,
        messages: &[Message],
        model: &str,
    ) -> std::result::Result<String, ProviderError> {
        match self {
            Self::OpenaiCompat(p) => p.summarize_title(messages, model).await,
            Self::Anthropic(p) => p.summarize_title(messages, model).await,
            Self::Gemini(p) => p.summarize_title(messages, model).await,
            Self::Ollama(p) => p.summarize_title(messages, model).await,
        }
    }

    async fn check(&self, model: &str) -> std::result::Result<bool, ProviderError> {
        match self {
            Self::OpenaiCompat(p) => p.check(model).await,
            Self::Anthropic(p) => p.check(model).await,
            Self::Gemini(p) => p.check(model).await,
            Self::Ollama(p) => p.check(model).await,
        }
    }
}

/// Builds adapters from configuration and caches them per provider id.
pub struct ProviderRegistry {
    config: LoomConfig,
    clients: Mutex<HashMap<String, Arc<ProviderClient>>>,
}

impl ProviderRegistry {
    pub fn new(config: LoomConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The configuration this registry was built from.
    pub fn config(&self) -> &LoomConfig {
        &self.config
    }

    /// Get (building and caching on first use) the adapter for a provider.
    pub fn get(&self, provider_id: &str) -> Result<Arc<ProviderClient>, ConfigError> {
        let mut clients = self.clients.lock().expect("provider cache poisoned");
        if let Some(client) = clients.get(provider_id) {
            return Ok(client.clone());
        }

        let descriptor = self.config.provider(provider_id)?;
        let client = Arc::new(ProviderClient::from_descriptor(descriptor)?);
        debug!(provider = %provider_id, "Built provider adapter");
        clients.insert(provider_id.to_string(), client.clone());
        Ok(client)
    }

    /// All configured provider ids.
    pub fn provider_ids(&self) -> Vec<String> {
        self.config.providers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatloom_config::{Capabilities, ModelInfo};

    fn config() -> LoomConfig {
        let mut config = LoomConfig::default();
        config.providers.insert(
            "openai".into(),
            ProviderDescriptor {
                id: "openai".into(),
                display_name: "OpenAI".into(),
                kind: ProviderKind::OpenaiCompat,
                base_url: None,
                api_key: Some("sk-test".into()),
                capabilities: Capabilities {
                    vision: true,
                    tools: true,
                    reasoning: false,
                },
                models: vec![ModelInfo {
                    id: "gpt-4o".into(),
                    context_length: 128_000,
                    max_output_tokens: 16_384,
                }],
            },
        );
        config.providers.insert(
            "local".into(),
            ProviderDescriptor {
                id: "local".into(),
                display_name: "Local".into(),
                kind: ProviderKind::Ollama,
                base_url: None,
                api_key: None,
                capabilities: Capabilities::default(),
                models: vec![],
            },
        );
        config
    }

    #[test]
    fn builds_and_caches_adapters() {
        let registry = ProviderRegistry::new(config());
        let first = registry.get("openai").unwrap();
        let second = registry.get("openai").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "openai");
    }

    #[test]
    fn unknown_provider_fails_fast() {
        let registry = ProviderRegistry::new(config());
        assert!(matches!(
            registry.get("missing"),
            Err(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn missing_credential_fails_fast() {
        let mut cfg = config();
        cfg.providers.get_mut("openai").unwrap().api_key = None;
        let registry = ProviderRegistry::new(cfg);
        assert!(matches!(
            registry.get("openai"),
            Err(ConfigError::MissingCredential { .. })
        ));
    }

    #[test]
    fn ollama_builds_without_credential() {
        let registry = ProviderRegistry::new(config());
        let client = registry.get("local").unwrap();
        assert!(matches!(client.as_ref(), ProviderClient::Ollama(_)));
    }

    #[test]
    fn kind_selects_variant() {
        let descriptor = ProviderDescriptor {
            id: "gem".into(),
            display_name: String::new(),
            kind: ProviderKind::Gemini,
            base_url: None,
            api_key: Some("key".into()),
            capabilities: Capabilities::default(),
            models: vec![],
        };
        let client = ProviderClient::from_descriptor(&descriptor).unwrap();
        assert!(matches!(client, ProviderClient::Gemini(_)));
    }
}
