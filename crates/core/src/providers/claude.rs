//! Claude Code CLI backend
//!
//! Spawns the `claude` binary in print mode. The prompt travels on
//! stdin; the response arrives on stdout while progress noise goes to
//! stderr and is ignored.

use crate::config::ProviderOptions;
use crate::providers::{binary_on_path, run_cli, Provider, ProviderError};
use async_trait::async_trait;
use std::time::Duration;

const BINARY: &str = "claude";
const MAX_PROMPT_CHARS: usize = 400_000;

/// CLI provider for Claude Code
#[derive(Debug, Clone)]
pub struct ClaudeCliProvider {
    options: ProviderOptions,
}

impl ClaudeCliProvider {
    /// Create the provider with the given options
    pub fn new(options: ProviderOptions) -> Self {
        Self { options }
    }

    fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "text".to_string(),
        ];
        if let Some(model) = &self.options.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args
    }
}

#[async_trait]
impl Provider for ClaudeCliProvider {
    fn name(&self) -> &'static str {
        "claude"
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
        MAX_PROMPT_CHARS
    }

    fn timeout_for(&self, prompt_chars: usize) -> Duration {
        let seconds = match prompt_chars {
            0..=20_000 => 240,
            20_001..=100_000 => 480,
            _ => 900,
        };
        Duration::from_secs(seconds)
    }

    async fn invoke_with_timeout(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        self.probe().await?;
        run_cli(BINARY, &self.build_args(), Some(prompt), timeout).await
    }
}
