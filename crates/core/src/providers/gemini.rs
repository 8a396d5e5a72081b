//! Gemini backends
//!
//! Two variants share this module: the `gemini` CLI (prompt on argv)
//! and the Generative Language HTTP API (keyed by `GEMINI_API_KEY`).

use crate::config::ProviderOptions;
use crate::providers::{binary_on_path, credential_from_env, run_cli, Provider, ProviderError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const BINARY: &str = "gemini";
const API_KEY_VAR: &str = "GEMINI_API_KEY";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const CLI_MAX_PROMPT_CHARS: usize = 200_000;
const API_MAX_PROMPT_CHARS: usize = 800_000;

/// CLI provider for the Gemini command-line tool
#[derive(Debug, Clone)]
pub struct GeminiCliProvider {
    options: ProviderOptions,
}

impl GeminiCliProvider {
    /// Create the provider with the given options
    pub fn new(options: ProviderOptions) -> Self {
        Self { options }
    }

    fn build_args(&self, prompt: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(model) = &self.options.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.push("-p".to_string());
        args.push(prompt.to_string());
        args
    }
}

#[async_trait]
impl Provider for GeminiCliProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        if binary_on_path(BINARY) {
            Ok(())
        } else {
            Err(ProviderError::Unavailable(format!(
                "{} binary not on PATH",
                BINARY
            )))
        }
    }

    fn max_prompt_chars(&self) -> usize {
        CLI_MAX_PROMPT_CHARS
    }

    fn timeout_for(&self, prompt_chars: usize) -> Duration {
        let seconds = match prompt_chars {
            0..=30_000 => 120,
            30_001..=120_000 => 300,
            _ => 600,
        };
        Duration::from_secs(seconds)
    }

    async fn invoke_with_timeout(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        self.probe().await?;
        run_cli(BINARY, &self.build_args(prompt), None, timeout).await
    }
}

/// HTTP API provider for Gemini
#[derive(Debug, Clone)]
pub struct GeminiApiProvider {
    options: ProviderOptions,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiApiProvider {
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
}

#[async_trait]
impl Provider for GeminiApiProvider {
    fn name(&self) -> &'static str {
        "gemini-api"
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        credential_from_env(API_KEY_VAR).map(|_| ())
    }

    fn max_prompt_chars(&self) -> usize {
        API_MAX_PROMPT_CHARS
    }

    fn timeout_for(&self, prompt_chars: usize) -> Duration {
        let seconds = match prompt_chars {
            0..=50_000 => 120,
            50_001..=200_000 => 240,
            _ => 480,
        };
        Duration::from_secs(seconds)
    }

    async fn invoke_with_timeout(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let api_key = credential_from_env(API_KEY_VAR)?;
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model(),
            api_key
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.options.temperature,
                max_output_tokens: self.options.max_output_tokens,
            },
        };

        debug!("POST {} ({} prompt chars)", self.base_url, prompt.len());
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&request)
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

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("bad response body: {}", e)))?;

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("no candidates returned".to_string()))?;

        let text: String = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if candidate.finish_reason.as_deref() == Some("MAX_TOKENS") {
            return Err(ProviderError::Truncated(
                "finish reason MAX_TOKENS".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Err(ProviderError::InvalidResponse(
                "empty candidate text".to_string(),
            ));
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}
