//! Generative model providers.
//!
//! Implements [`LanguageModel`] for:
//! - **[`DisabledModel`]**: always fails; turns end in the apology path.
//! - **[`OpenAIChat`]**: `POST /v1/chat/completions` with the prompt as a
//!   single user message. Requires `OPENAI_API_KEY`.
//! - **[`OllamaChat`]**: `POST /api/generate` with `stream = false`.
//!
//! Both network providers use the retry policy in [`crate::http`].
//!
//! ```rust,no_run
//! # use docchat::config::LlmConfig;
//! # use docchat::llm::create_model;
//! # use docchat_core::llm::LanguageModel;
//! let model = create_model(&LlmConfig::default()).unwrap();
//! assert_eq!(model.model_name(), "disabled");
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use docchat_core::llm::LanguageModel;

use crate::config::LlmConfig;
use crate::http;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("Language model provider is disabled")
    }
}

pub struct OpenAIChat {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIChat {
    /// # Errors
    ///
    /// Returns an error if `model` is not set or `OPENAI_API_KEY` is missing.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        Ok(Self {
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = http::send_json("OpenAI API", self.max_retries, || {
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
        })
        .await?;

        parse_openai_chat(&response)
    }
}

/// Extract `choices[0].message.content`.
fn parse_openai_chat(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

pub struct OllamaChat {
    model: String,
    url: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_BASE_URL.to_string());

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.url);
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });

        let response = http::send_json("Ollama API", self.max_retries, || {
            self.client.post(&url).json(&body)
        })
        .await?;

        response
            .get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }
}

/// Create the configured [`LanguageModel`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledModel`] |
/// | `"openai"` | [`OpenAIChat`] |
/// | `"ollama"` | [`OllamaChat`] |
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_chat() {
        let json = json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hello!" } }]
        });
        assert_eq!(parse_openai_chat(&json).unwrap(), "Hello!");
    }

    #[test]
    fn test_parse_openai_chat_missing_content() {
        assert!(parse_openai_chat(&json!({ "choices": [] })).is_err());
        assert!(parse_openai_chat(&json!({})).is_err());
    }

    #[tokio::test]
    async fn test_disabled_model_fails() {
        let model = create_model(&LlmConfig::default()).unwrap();
        assert_eq!(model.model_name(), "disabled");
        let err = model.complete("hi").await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn test_ollama_trims_trailing_slash() {
        let config = LlmConfig {
            provider: "ollama".to_string(),
            model: Some("llama3".to_string()),
            url: Some("http://gpu-box:11434/".to_string()),
            ..LlmConfig::default()
        };
        let model = OllamaChat::new(&config).unwrap();
        assert_eq!(model.url, "http://gpu-box:11434");
        assert_eq!(model.model_name(), "llama3");
    }
}
