//! LLM provider abstraction
//!
//! Backends come in two variants: CLI tools spawned per invocation
//! (prompt on stdin or argv) and native HTTP APIs. Both sit behind the
//! [`Provider`] trait; the registry resolves a name to an instance.
//! Providers hold no shared mutable state.

use crate::config::ProviderOptions;
use crate::error::{Result, SkillsmithError};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

pub mod anthropic;
pub mod claude;
pub mod codex;
pub mod gemini;
pub mod glm;

pub use anthropic::AnthropicProvider;
pub use claude::ClaudeCliProvider;
pub use codex::CodexCliProvider;
pub use gemini::{GeminiApiProvider, GeminiCliProvider};
pub use glm::GlmProvider;

/// Typed failure raised by a provider invocation
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Binary missing from PATH or credentials absent
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Invocation exceeded its computed timeout
    #[error("timed out after {0}s")]
    Timeout(u64),

    /// Output cut off by a token limit; retryable with a smaller chunk
    #[error("output truncated: {0}")]
    Truncated(String),

    /// HTTP/SDK or subprocess failure (network, quota, auth, exit code)
    #[error("api error: {0}")]
    Api(String),

    /// Empty or malformed output
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Stable kind string matching the pipeline error taxonomy
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "provider-unavailable",
            Self::Timeout(_) => "provider-timeout",
            Self::Truncated(_) => "provider-truncated",
            Self::Api(_) => "provider-api-error",
            Self::InvalidResponse(_) => "invalid-response",
        }
    }

    /// Lift into the pipeline error type, naming the provider
    pub fn into_pipeline_error(self, provider: &str) -> SkillsmithError {
        match self {
            Self::Unavailable(msg) => SkillsmithError::provider_unavailable(provider, msg),
            Self::Timeout(seconds) => SkillsmithError::provider_timeout(provider, seconds),
            Self::Truncated(msg) => SkillsmithError::provider_truncated(provider, msg),
            Self::Api(msg) => SkillsmithError::provider_api(provider, msg),
            Self::InvalidResponse(msg) => SkillsmithError::invalid_response(msg),
        }
    }
}

/// Capability set every LLM backend exposes
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Stable identifier used in progress records and logs
    fn name(&self) -> &'static str;

    /// Check readiness; `Err(Unavailable)` carries the reason
    async fn probe(&self) -> std::result::Result<(), ProviderError>;

    /// True iff the provider is ready to be invoked
    async fn is_available(&self) -> bool {
        self.probe().await.is_ok()
    }

    /// Character count a single prompt must not exceed
    fn max_prompt_chars(&self) -> usize;

    /// Timeout for a prompt of the given character length
    ///
    /// Provider-specific and tiered by content size; never below the
    /// provider's floor.
    fn timeout_for(&self, prompt_chars: usize) -> Duration;

    /// Invoke the backend and return its textual response
    ///
    /// Uses the standard timeout for the prompt's length.
    async fn invoke(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        self.invoke_with_timeout(prompt, self.timeout_for(prompt.len()))
            .await
    }

    /// Invoke the backend under an explicit timeout
    ///
    /// Callers doing long-form work (the index enhancer) pass an
    /// enlarged timeout here instead of the computed default.
    async fn invoke_with_timeout(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> std::result::Result<String, ProviderError>;
}

/// Resolves provider names to instances
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    options: ProviderOptions,
}

impl ProviderRegistry {
    /// Create a registry with the given provider options
    pub fn new(options: ProviderOptions) -> Self {
        Self { options }
    }

    /// Names the registry can resolve
    pub fn known_providers() -> &'static [&'static str] {
        &["claude", "codex", "gemini", "gemini-api", "glm", "anthropic"]
    }

    /// Resolve a provider name to an instance
    ///
    /// Unknown names report `provider-unavailable` uniformly, matching
    /// the behavior of a known backend that cannot be used.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Provider>> {
        let provider: Arc<dyn Provider> = match name {
            "claude" => Arc::new(ClaudeCliProvider::new(self.options.clone())),
            "codex" => Arc::new(CodexCliProvider::new(self.options.clone())),
            "gemini" => Arc::new(GeminiCliProvider::new(self.options.clone())),
            "gemini-api" => Arc::new(GeminiApiProvider::new(self.options.clone())),
            "glm" => Arc::new(GlmProvider::new(self.options.clone())),
            "anthropic" => Arc::new(AnthropicProvider::new(self.options.clone())),
            other => {
                return Err(SkillsmithError::provider_unavailable(
                    other,
                    format!(
                        "unknown provider; known providers: {}",
                        Self::known_providers().join(", ")
                    ),
                ))
            }
        };
        Ok(provider)
    }
}

/// Check whether a binary is reachable through PATH
pub(crate) fn binary_on_path(binary: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| is_executable(&dir.join(binary)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Read a credential from the process environment
pub(crate) fn credential_from_env(var: &str) -> std::result::Result<String, ProviderError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ProviderError::Unavailable(format!("{} not set", var))),
    }
}

/// Run a CLI provider subprocess with a timeout
///
/// The prompt travels on stdin when `stdin_payload` is set, otherwise it
/// must already be part of `args`. Stdout holds the response; stderr is
/// diagnostic only. On timeout the child is killed (`kill_on_drop`)
/// before the error returns.
pub(crate) async fn run_cli(
    program: &str,
    args: &[String],
    stdin_payload: Option<&str>,
    timeout: Duration,
) -> std::result::Result<String, ProviderError> {
    debug!(
        "Spawning {} with {} args (timeout {}s)",
        program,
        args.len(),
        timeout.as_secs()
    );

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if stdin_payload.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| ProviderError::Unavailable(format!("failed to spawn {}: {}", program, e)))?;

    if let Some(payload) = stdin_payload {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProviderError::Api("child stdin unavailable".to_string()))?;
        stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| ProviderError::Api(format!("failed to write prompt: {}", e)))?;
        // Dropping stdin closes the pipe so the child sees EOF
        drop(stdin);
    }

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(ProviderError::Api(format!("wait failed: {}", e))),
        Err(_) => {
            warn!("{} timed out after {}s, killing", program, timeout.as_secs());
            return Err(ProviderError::Timeout(timeout.as_secs()));
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        let detail = stderr.trim();
        return Err(ProviderError::Api(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            if detail.is_empty() { "(no stderr)" } else { detail }
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        return Err(ProviderError::InvalidResponse(format!(
            "{} produced no output",
            program
        )));
    }
    Ok(stdout)
}
