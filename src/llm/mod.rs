//! Inference backend integration.
//!
//! The relay talks to the model only through `InferenceBackend`. The built-in
//! implementation wraps a rig-core agent:
//! - **Anthropic**: Direct API access via rig-core
//! - **OpenAI**: Direct API access via rig-core

mod rig_backend;

pub use rig_backend::RigBackend;

use async_trait::async_trait;
use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::config::{DEFAULT_SYSTEM_PROMPT, env_or, env_parse};
use crate::error::{ConfigError, InferenceError};

/// A conversational backend: text in, text out.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Produce a reply to `text`. May take arbitrarily long; callers apply
    /// their own timeout.
    async fn respond(&self, text: &str) -> Result<String, InferenceError>;

    /// Release backend resources. Called once when the relay stops.
    async fn close(&self) -> Result<(), InferenceError> {
        Ok(())
    }
}

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::OpenAi => "gpt-4o",
        }
    }

    fn api_key_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl std::str::FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" | "open_ai" => Ok(Self::OpenAi),
            other => Err(ConfigError::InvalidValue {
                key: "RELAY_LLM_BACKEND".into(),
                message: format!("unknown backend '{other}' (expected anthropic or openai)"),
            }),
        }
    }
}

/// Configuration for creating an inference backend.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    /// System preamble given to the agent.
    pub preamble: String,
    pub max_tokens: u64,
}

impl LlmConfig {
    /// Read the backend configuration from the environment.
    ///
    /// - `RELAY_LLM_BACKEND`: `anthropic` (default) or `openai`
    /// - `ANTHROPIC_API_KEY` / `OPENAI_API_KEY`: required for the chosen backend
    /// - `RELAY_MODEL`: model name (backend-specific default)
    /// - `RELAY_SYSTEM_PROMPT`: agent preamble
    /// - `RELAY_MAX_TOKENS`: completion limit (default 2048)
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend: LlmBackend = env_or("RELAY_LLM_BACKEND", "anthropic").parse()?;

        let key_var = backend.api_key_var();
        let api_key = std::env::var(key_var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(key_var.to_string()))?;

        Ok(Self {
            backend,
            api_key: secrecy::SecretString::from(api_key),
            model: env_or("RELAY_MODEL", backend.default_model()),
            preamble: env_or("RELAY_SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT),
            max_tokens: env_parse("RELAY_MAX_TOKENS", 2048)?,
        })
    }
}

/// Create an inference backend from configuration.
///
/// Must be called from inside a Tokio runtime: building the rig agent spawns
/// its tool server task.
pub fn create_backend(config: &LlmConfig) -> Result<Box<dyn InferenceBackend>, InferenceError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_backend(config),
        LlmBackend::OpenAi => create_openai_backend(config),
    }
}

fn create_anthropic_backend(
    config: &LlmConfig,
) -> Result<Box<dyn InferenceBackend>, InferenceError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            InferenceError::ClientCreation {
                backend: "anthropic".to_string(),
                reason: e.to_string(),
            }
        })?;

    let agent = client
        .agent(&config.model)
        .preamble(&config.preamble)
        .max_tokens(config.max_tokens)
        .build();
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Box::new(RigBackend::new(agent, "anthropic", &config.model)))
}

fn create_openai_backend(config: &LlmConfig) -> Result<Box<dyn InferenceBackend>, InferenceError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            InferenceError::ClientCreation {
                backend: "openai".to_string(),
                reason: e.to_string(),
            }
        })?;

    let agent = client
        .agent(&config.model)
        .preamble(&config.preamble)
        .max_tokens(config.max_tokens)
        .build();
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Box::new(RigBackend::new(agent, "openai", &config.model)))
}
