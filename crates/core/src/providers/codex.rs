//! Codex CLI backend
//!
//! Spawns `codex exec` with the prompt as a command argument and reads
//! the response from stdout.

use crate::config::ProviderOptions;
use crate::providers::{binary_on_path, run_cli, Provider, ProviderError};
use async_trait::async_trait;
use std::time::Duration;

const BINARY: &str = "codex";
const MAX_PROMPT_CHARS: usize = 200_000;

/// CLI provider for Codex
#[derive(Debug, Clone)]
pub struct CodexCliProvider {
    options: ProviderOptions,
}

impl CodexCliProvider {
    /// Create the provider with the given options
    pub fn new(options: ProviderOptions) -> Self {
        Self { options }
    }

    fn build_args(&self, prompt: &str) -> Vec<String> {
        let mut args = vec!["exec".to_string(), "--skip-git-repo-check".to_string()];
        if let Some(model) = &self.options.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.push(prompt.to_string());
        args
    }
}

#[async_trait]
impl Provider for CodexCliProvider {
    fn name(&self) -> &'static str {
        "codex"
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
        // Argv transport: the prompt must fit in a command line
        MAX_PROMPT_CHARS
    }

    fn timeout_for(&self, prompt_chars: usize) -> Duration {
        let seconds = match prompt_chars {
            0..=20_000 => 180,
            20_001..=100_000 => 360,
            _ => 720,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lands_in_argv() {
        let provider = CodexCliProvider::new(ProviderOptions::default());
        let args = provider.build_args("summarize this");
        assert_eq!(args.first().map(String::as_str), Some("exec"));
        assert_eq!(args.last().map(String::as_str), Some("summarize this"));
    }

    #[test]
    fn test_timeout_floor() {
        let provider = CodexCliProvider::new(ProviderOptions::default());
        assert_eq!(provider.timeout_for(10), Duration::from_secs(180));
        assert_eq!(provider.timeout_for(150_000), Duration::from_secs(720));
    }

    #[tokio::test]
    async fn test_invoke_without_binary_reports_unavailable() {
        if binary_on_path(BINARY) {
            return;
        }
        let provider = CodexCliProvider::new(ProviderOptions::default());
        let err = provider.invoke("hi").await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
