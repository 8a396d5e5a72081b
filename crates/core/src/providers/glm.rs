//! GLM HTTP API backend
//!
//! Talks to the Zhipu chat-completions endpoint, keyed by
//! `GLM_API_KEY`. This is the one backend that recognizes the
//! `enable_thinking` option.

use crate::config::ProviderOptions;
use crate::providers::{credential_from_env, Provider, ProviderError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const API_KEY_VAR: &str = "GLM_API_KEY";
const DEFAULT_MODEL: &str = "glm-4.5";
const DEFAULT_API_BASE: &str = "https://open.bigmodel.cn/api/paas/v4";
const MAX_PROMPT_CHARS: usize = 300_000;

/// HTTP API provider for GLM
#[derive(Debug, Clone)]
pub struct GlmProvider {
    options: ProviderOptions,
    base_url: String,
    client: reqwest::Client,
}

impl GlmProvider {
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

    fn build_request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model().to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.options.temperature,
            max_tokens: self.options.max_output_tokens,
            thinking: self.options.enable_thinking.then(|| Thinking {
                kind: "enabled".to_string(),
            }),
        }
    }
}

#[async_trait]
impl Provider for GlmProvider {
    fn name(&self) -> &'static str {
        "glm"
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        credential_from_env(API_KEY_VAR).map(|_| ())
    }

    fn max_prompt_chars(&self) -> usize {
        MAX_PROMPT_CHARS
    }

    fn timeout_for(&self, prompt_chars: usize) -> Duration {
        // Thinking mode roughly doubles latency
        let base = match prompt_chars {
            0..=30_000 => 180,
            30_001..=120_000 => 360,
            _ => 600,
        };
        let seconds = if self.options.enable_thinking {
            base * 2
        } else {
            base
        };
        Duration::from_secs(seconds)
    }

    async fn invoke_with_timeout(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let api_key = credential_from_env(API_KEY_VAR)?;
        let url = format!("{}/chat/completions", self.base_url);

        debug!("POST {} ({} prompt chars)", url, prompt.len());
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .bearer_auth(api_key)
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

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("bad response body: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("no choices returned".to_string()))?;

        if choice.finish_reason.as_deref() == Some("length") {
            return Err(ProviderError::Truncated(
                "finish reason 'length'".to_string(),
            ));
        }
        let content = choice.message.content;
        if content.trim().is_empty() {
            return Err(ProviderError::InvalidResponse(
                "empty message content".to_string(),
            ));
        }
        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<Thinking>,
}

#[derive(Debug, Serialize)]
struct Thinking {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}
