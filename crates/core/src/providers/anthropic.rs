//! Anthropic Messages API backend
//!
//! Keyed by `ANTHROPIC_API_KEY`. A `max_tokens` stop reason is a
//! distinct, retryable truncation error.

use crate::config::ProviderOptions;
use crate::providers::{credential_from_env, Provider, ProviderError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_MAX_TOKENS: u32 = 8_192;
const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const MAX_PROMPT_CHARS: usize = 600_000;

/// HTTP API provider for Anthropic
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    options: ProviderOptions,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create the provider with the given options
    pub fn new(options: ProviderOptions) -> Self {
        Self::with_base_url(options, DEFAULT_API_BASE.to_string())
    }

    /// Create the provider against a custom API base URL
    pub fn with_base_url(options: ProviderOptions, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            options,
            base_url,
            client,
        }
    }

    fn model(&self) -> &str {
        self.options.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    fn build_request(&self, prompt: &str) -> MessagesRequest {
        MessagesRequest {
            model: self.model().to_string(),
            max_tokens: self.options.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: vec![MessageParam {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.options.temperature,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        credential_from_env(API_KEY_VAR).map(|_| ())
    }

    fn max_prompt_chars(&self) -> usize {
        MAX_PROMPT_CHARS
    }

    fn timeout_for(&self, prompt_chars: usize) -> Duration {
        let seconds = match prompt_chars {
            0..=40_000 => 120,
            40_001..=200_000 => 300,
            _ => 600,
        };
        Duration::from_secs(seconds)
    }

    async fn invoke_with_timeout(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let api_key = credential_from_env(API_KEY_VAR)?;
        let url = format!("{}/v1/messages", self.base_url);

        debug!("POST {} ({} prompt chars)", url, prompt.len());
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.build_request(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(timeout.as_secs())
                } else {
                    ProviderError::Api(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("HTTP {}: {}", status, body)));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("bad response body: {}", e)))?;

        if parsed.stop_reason.as_deref() == Some("max_tokens") {
            return Err(ProviderError::Truncated(
                "stop reason max_tokens".to_string(),
            ));
        }

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ProviderError::InvalidResponse(
                "no text blocks in response".to_string(),
            ));
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<MessageParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct MessageParam {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}
