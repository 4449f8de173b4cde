//! Provider configuration for chatloom.
//!
//! Loads provider descriptors from a TOML file with environment variable
//! overrides for credentials. Everything here is **read-only** to the
//! orchestration core: the registry consumes descriptors, it never writes
//! them back. Validation is fail-fast — a bad descriptor is rejected before
//! any network call is made.

use chatloom_core::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown provider id: {0}")]
    UnknownProvider(String),

    #[error("Unknown model '{model}' for provider '{provider}'")]
    UnknownModel { provider: String, model: String },

    #[error("Provider '{provider}' has no API key configured")]
    MissingCredential { provider: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for ProviderError {
    fn from(err: ConfigError) -> Self {
        ProviderError::NotConfigured(err.to_string())
    }
}

/// The backend family a descriptor belongs to. A closed set — one variant
/// per wire dialect the adapters implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Any `/chat/completions`-shaped endpoint (OpenAI, OpenRouter, vLLM, …)
    OpenaiCompat,
    /// Anthropic Messages API
    Anthropic,
    /// Google Gemini generateContent API
    Gemini,
    /// Ollama's native local-inference protocol
    Ollama,
}

impl ProviderKind {
    /// Whether this backend requires a credential.
    pub fn requires_api_key(self) -> bool {
        !matches!(self, Self::Ollama)
    }

    /// Default base URL for the family.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenaiCompat => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::Ollama => "http://localhost:11434",
        }
    }
}

/// Capability flags for a provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// Accepts image content parts
    #[serde(default)]
    pub vision: bool,

    /// Supports function/tool calling
    #[serde(default)]
    pub tools: bool,

    /// Emits separable reasoning content (native field or embedded markers)
    #[serde(default)]
    pub reasoning: bool,
}

/// Per-model limits from the provider's catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier as the backend knows it
    pub id: String,

    /// Total context window in tokens
    #[serde(default = "default_context_length")]
    pub context_length: usize,

    /// Maximum tokens the model may generate per response
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_context_length() -> usize {
    128_000
}
fn default_max_output_tokens() -> u32 {
    4096
}

/// One configured backend: identity, endpoint, credential, capabilities,
/// and its model catalog.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Opaque provider id, unique within the config
    pub id: String,

    /// Human-readable display name
    #[serde(default)]
    pub display_name: String,

    /// Which adapter family speaks to this backend
    pub kind: ProviderKind,

    /// Base endpoint; falls back to the family default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API key; may also come from `CHATLOOM_<ID>_API_KEY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Capability flags
    #[serde(default)]
    pub capabilities: Capabilities,

    /// Known models with their limits
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("capabilities", &self.capabilities)
            .field("models", &self.models)
            .finish()
    }
}

impl ProviderDescriptor {
    /// The effective endpoint, with the family default as fallback.
    pub fn endpoint(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
    }

    /// Look up a model in the catalog.
    pub fn model(&self, model_id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == model_id)
    }
}

/// The root configuration: enabled providers plus engine-wide limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoomConfig {
    /// Maximum concurrently active generation sessions
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_streams: usize,

    /// Maximum tool invocations per generation, across all loop rounds
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,

    /// All configured providers, keyed by id
    #[serde(default)]
    pub providers: HashMap<String, ProviderDescriptor>,
}

fn default_max_concurrent() -> usize {
    8
}
fn default_max_tool_calls() -> u32 {
    25
}

impl Default for LoomConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams: default_max_concurrent(),
            max_tool_calls: default_max_tool_calls(),
            providers: HashMap::new(),
        }
    }
}

impl LoomConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: LoomConfig = toml::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        debug!(providers = config.providers.len(), "Loaded configuration");
        Ok(config)
    }

    /// Fill in API keys from `CHATLOOM_<ID>_API_KEY` environment variables.
    fn apply_env_overrides(&mut self) {
        for (id, descriptor) in &mut self.providers {
            if descriptor.api_key.is_none() {
                let var = format!("CHATLOOM_{}_API_KEY", id.to_uppercase().replace('-', "_"));
                if let Ok(key) = std::env::var(&var) {
                    descriptor.api_key = Some(key);
                }
            }
        }
    }

    /// Fail-fast validation of every descriptor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_streams == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_streams must be at least 1".into(),
            ));
        }
        for (id, descriptor) in &self.providers {
            if descriptor.id != *id {
                return Err(ConfigError::Invalid(format!(
                    "provider table key '{id}' does not match descriptor id '{}'",
                    descriptor.id
                )));
            }
            if descriptor.kind.requires_api_key()
                && descriptor.api_key.as_deref().unwrap_or("").is_empty()
            {
                return Err(ConfigError::MissingCredential {
                    provider: id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Look up a descriptor; unknown ids fail fast.
    pub fn provider(&self, id: &str) -> Result<&ProviderDescriptor, ConfigError> {
        self.providers
            .get(id)
            .ok_or_else(|| ConfigError::UnknownProvider(id.to_string()))
    }

    /// Look up a model within a provider's catalog; unknown ids fail fast.
    pub fn model(&self, provider_id: &str, model_id: &str) -> Result<&ModelInfo, ConfigError> {
        let descriptor = self.provider(provider_id)?;
        descriptor.model(model_id).ok_or_else(|| ConfigError::UnknownModel {
            provider: provider_id.to_string(),
            model: model_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
max_concurrent_streams = 4
max_tool_calls = 10

[providers.openai]
id = "openai"
display_name = "OpenAI"
kind = "openai_compat"
api_key = "sk-test"
capabilities = { vision = true, tools = true }
models = [
    { id = "gpt-4o", context_length = 128000, max_output_tokens = 16384 },
]

[providers.local]
id = "local"
display_name = "Local"
kind = "ollama"
models = [
    { id = "qwen3:8b", context_length = 32768 },
]
"#
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_toml().as_bytes()).unwrap();

        let config = LoomConfig::load(file.path()).unwrap();
        assert_eq!(config.max_concurrent_streams, 4);
        assert_eq!(config.max_tool_calls, 10);
        assert_eq!(config.providers.len(), 2);

        let openai = config.provider("openai").unwrap();
        assert_eq!(openai.kind, ProviderKind::OpenaiCompat);
        assert!(openai.capabilities.vision);
        assert_eq!(openai.model("gpt-4o").unwrap().max_output_tokens, 16384);
    }

    #[test]
    fn ollama_needs_no_key() {
        let config: LoomConfig = toml::from_str(sample_toml()).unwrap();
        assert!(config.validate().is_ok());
        let local = config.provider("local").unwrap();
        assert_eq!(local.endpoint(), "http://localhost:11434");
        // default limit filled in
        assert_eq!(local.model("qwen3:8b").unwrap().max_output_tokens, 4096);
    }

    #[test]
    fn missing_credential_fails_fast() {
        let toml_str = r#"
[providers.anthropic]
id = "anthropic"
kind = "anthropic"
models = []
"#;
        let config: LoomConfig = toml::from_str(toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
    }

    #[test]
    fn unknown_provider_fails_fast() {
        let config = LoomConfig::default();
        assert!(matches!(
            config.provider("nope"),
            Err(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn unknown_model_fails_fast() {
        let config: LoomConfig = toml::from_str(sample_toml()).unwrap();
        let err = config.model("openai", "gpt-9").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownModel { .. }));
    }

    #[test]
    fn mismatched_table_key_is_invalid() {
        let toml_str = r#"
[providers.a]
id = "b"
kind = "ollama"
"#;
        let config: LoomConfig = toml::from_str(toml_str).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config: LoomConfig = toml::from_str(sample_toml()).unwrap();
        let debug = format!("{:?}", config.provider("openai").unwrap());
        assert!(!debug.contains("sk-test"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn zero_concurrency_is_invalid() {
        let config: LoomConfig = toml::from_str("max_concurrent_streams = 0").unwrap();
        assert!(config.validate().is_err());
    }
}
