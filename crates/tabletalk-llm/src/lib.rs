//! Language-model provider adapters.
//!
//! The core depends only on the narrow [`LanguageModel`] capability: text
//! in, text out, bounded by a timeout. Everything provider-specific
//! (request payloads, auth headers, endpoints) lives here, behind cargo
//! features so restricted builds can drop the HTTP stack entirely.

pub mod mock;
#[cfg(any(feature = "llm-openai", feature = "llm-anthropic", feature = "llm-ollama"))]
pub mod providers;

pub use mock::MockModel;

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tabletalk_core::LanguageModel;

// Provider configuration env vars. Key and model resolution follows the
// usual conventions; base URLs are overridable for proxies and local
// gateways.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_MODEL_ENV: &str = "OPENAI_MODEL";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_MODEL_ENV: &str = "ANTHROPIC_MODEL";
pub const ANTHROPIC_BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";
pub const ANTHROPIC_VERSION_ENV: &str = "ANTHROPIC_VERSION";
pub const OLLAMA_URL_ENV: &str = "TABLETALK_OLLAMA_URL";
pub const OLLAMA_MODEL_ENV: &str = "TABLETALK_OLLAMA_MODEL";

/// Build a model client by provider name.
///
/// `mock:<reply>` yields a scripted client for offline use and tests.
pub fn create_model(provider: &str) -> Result<Arc<dyn LanguageModel>> {
    match provider {
        #[cfg(feature = "llm-openai")]
        "openai" => {
            let api_key = require_env(OPENAI_API_KEY_ENV)?;
            let model = env_or(OPENAI_MODEL_ENV, "gpt-4o-mini");
            let base_url = env_or(OPENAI_BASE_URL_ENV, providers::DEFAULT_OPENAI_BASE_URL);
            Ok(Arc::new(providers::OpenAiModel::new(
                api_key, model, base_url,
            )))
        }
        #[cfg(feature = "llm-anthropic")]
        "anthropic" => {
            let api_key = require_env(ANTHROPIC_API_KEY_ENV)?;
            let model = env_or(ANTHROPIC_MODEL_ENV, "claude-3-5-haiku-latest");
            let base_url = env_or(ANTHROPIC_BASE_URL_ENV, providers::DEFAULT_ANTHROPIC_BASE_URL);
            let version = env_or(ANTHROPIC_VERSION_ENV, providers::DEFAULT_ANTHROPIC_VERSION);
            Ok(Arc::new(providers::AnthropicModel::new(
                api_key, model, base_url, version,
            )))
        }
        #[cfg(feature = "llm-ollama")]
        "ollama" => {
            let url = env_or(OLLAMA_URL_ENV, providers::DEFAULT_OLLAMA_URL);
            let model = env_or(OLLAMA_MODEL_ENV, "llama3.1");
            Ok(Arc::new(providers::OllamaModel::new(url, model)))
        }
        other => {
            if let Some(reply) = other.strip_prefix("mock:") {
                return Ok(Arc::new(MockModel::always(reply)));
            }
            Err(anyhow!(
                "unknown model provider {other:?} (expected openai, anthropic, ollama, or mock:<reply>)"
            ))
        }
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{name} is not set"))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
