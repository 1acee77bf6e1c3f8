//! HTTP adapters for hosted and local model providers.
//!
//! Each adapter builds the provider's payload, applies the request timeout,
//! and maps transport failures into [`ModelError`]. Response bodies are
//! reduced to the completion text; nothing provider-shaped escapes this
//! module.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tabletalk_core::{LanguageModel, ModelError};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

// Translation replies are short; this bounds cost, not quality.
const MAX_OUTPUT_TOKENS: u32 = 1_200;
// Low temperature: we want the most literal translation, not creativity.
const TEMPERATURE: f32 = 0.1;

fn map_transport(err: reqwest::Error, timeout: Duration) -> ModelError {
    if err.is_timeout() {
        ModelError::Timeout(timeout)
    } else {
        ModelError::Network(err.to_string())
    }
}

async fn read_error_body(response: reqwest::Response) -> ModelError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let preview: String = body.chars().take(400).collect();
    ModelError::Api(format!("{status}: {preview}"))
}

/// OpenAI chat-completions adapter.
#[cfg(feature = "llm-openai")]
pub struct OpenAiModel {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

#[cfg(feature = "llm-openai")]
impl OpenAiModel {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            model,
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "llm-openai")]
#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, ModelError> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": MAX_OUTPUT_TOKENS,
            "temperature": TEMPERATURE,
        });
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport(e, timeout))?;
        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                ModelError::InvalidResponse("missing choices[0].message.content".to_string())
            })
    }
}

/// Anthropic messages adapter.
#[cfg(feature = "llm-anthropic")]
pub struct AnthropicModel {
    api_key: String,
    model: String,
    base_url: String,
    version: String,
    client: reqwest::Client,
}

#[cfg(feature = "llm-anthropic")]
impl AnthropicModel {
    pub fn new(api_key: String, model: String, base_url: String, version: String) -> Self {
        Self {
            api_key,
            model,
            base_url,
            version,
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "llm-anthropic")]
#[async_trait]
impl LanguageModel for AnthropicModel {
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, ModelError> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "temperature": TEMPERATURE,
            "messages": [{"role": "user", "content": prompt}],
        });
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.version)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport(e, timeout))?;
        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
        value["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ModelError::InvalidResponse("missing content[0].text".to_string()))
    }
}

/// Ollama adapter for local models.
#[cfg(feature = "llm-ollama")]
pub struct OllamaModel {
    url: String,
    model: String,
    client: reqwest::Client,
}

#[cfg(feature = "llm-ollama")]
impl OllamaModel {
    pub fn new(url: String, model: String) -> Self {
        Self {
            url,
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "llm-ollama")]
#[async_trait]
impl LanguageModel for OllamaModel {
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, ModelError> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {"temperature": TEMPERATURE},
        });
        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport(e, timeout))?;
        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
        value["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ModelError::InvalidResponse("missing response field".to_string()))
    }
}
