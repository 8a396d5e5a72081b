//! The Stage 4 work unit
//!
//! A worker receives one chunk, builds the enhancement prompt, invokes
//! the provider, and writes either a completed or failed artifact.
//! Workers are idempotent: re-running the same chunk overwrites the same
//! artifact file in place. The subprocess entry point wraps everything
//! in a catch-all that records a failure artifact before exiting, so a
//! crash is indistinguishable from a failed chunk on the next scan.

use crate::cache::{CacheManager, STAGE_CHUNKS};
use crate::config::SkillsmithConfig;
use crate::error::{Result, SkillsmithError};
use crate::fsutil;
use crate::prompts::PromptTemplates;
use crate::providers::{Provider, ProviderRegistry};
use crate::types::{approximate_tokens, Chunk, ChunkStatus, EnhancedChunk};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Markers that flag a refusal instead of enhanced content
const REFUSAL_MARKERS: &[&str] = &[
    "i cannot assist",
    "i can't assist",
    "i cannot help with",
    "i'm unable to help",
    "as an ai language model",
];

/// Artifact file name for a chunk id, zero-padded to three digits
pub fn artifact_file_name(chunk_id: u32) -> String {
    format!("chunk-{:03}.json", chunk_id)
}

/// Everything a worker needs to process chunks
#[derive(Clone, Debug)]
pub struct WorkerContext {
    pub provider: Arc<dyn Provider>,
    pub templates: PromptTemplates,
    pub min_enhanced_chars: usize,
}

impl WorkerContext {
    /// Build a context from a provider and pipeline configuration
    pub fn new(provider: Arc<dyn Provider>, config: &SkillsmithConfig) -> Self {
        Self {
            provider,
            templates: config.prompts.clone(),
            min_enhanced_chars: config.enhancement.min_enhanced_chars,
        }
    }
}

/// Enhance one chunk and write its artifact
///
/// Always writes an artifact on a normal return: completed when the
/// provider produced acceptable content, failed otherwise. Oversized
/// chunks are recorded as failed without invoking the provider.
pub async fn enhance_chunk(
    ctx: &WorkerContext,
    chunk: &Chunk,
    output_dir: &Path,
) -> Result<EnhancedChunk> {
    let artifact = run_enhancement(ctx, chunk).await;
    let path = output_dir.join(artifact_file_name(chunk.id));
    fsutil::write_atomic_json(&path, &artifact).await?;
    debug!(
        "Wrote {} artifact for chunk {}",
        match artifact.status {
            ChunkStatus::Completed => "completed",
            ChunkStatus::Failed => "failed",
        },
        chunk.id
    );
    Ok(artifact)
}

async fn run_enhancement(ctx: &WorkerContext, chunk: &Chunk) -> EnhancedChunk {
    let provider_name = ctx.provider.name().to_string();
    let failed = |error: String| EnhancedChunk {
        chunk_id: chunk.id,
        title: chunk.title.clone(),
        slug: chunk.slug.clone(),
        enhanced_content: String::new(),
        enhanced_at: Utc::now(),
        provider: provider_name.clone(),
        status: ChunkStatus::Failed,
        token_count: 0,
        error: Some(error),
    };

    let max_chars = ctx.provider.max_prompt_chars();
    if chunk.char_count > max_chars {
        warn!(
            "Chunk {} ({} chars) exceeds provider limit of {} chars",
            chunk.id, chunk.char_count, max_chars
        );
        return failed(format!(
            "invalid-response: chunk of {} chars exceeds provider limit of {}",
            chunk.char_count, max_chars
        ));
    }

    let prompt = ctx
        .templates
        .enhancement_prompt(&chunk.title, chunk.chapter_number, &chunk.text);

    info!(
        "Enhancing chunk {} '{}' via {} ({} prompt chars)",
        chunk.id,
        chunk.title,
        provider_name,
        prompt.len()
    );

    let response = match ctx.provider.invoke(&prompt).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Chunk {} failed: {}: {}", chunk.id, e.kind(), e);
            return failed(format!("{}: {}", e.kind(), e));
        }
    };

    if let Err(reason) = validate_output(&response, ctx.min_enhanced_chars) {
        warn!("Chunk {} output rejected: {}", chunk.id, reason);
        return failed(format!("invalid-response: {}", reason));
    }

    EnhancedChunk {
        chunk_id: chunk.id,
        title: chunk.title.clone(),
        slug: chunk.slug.clone(),
        token_count: approximate_tokens(&response),
        enhanced_content: response,
        enhanced_at: Utc::now(),
        provider: provider_name,
        status: ChunkStatus::Completed,
        error: None,
    }
}

/// Check enhanced output before accepting it as completed
///
/// Only cheap structural checks happen here; semantic quality is the
/// index enhancer's concern.
fn validate_output(output: &str, min_chars: usize) -> std::result::Result<(), String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err("empty output".to_string());
    }
    if trimmed.len() < min_chars {
        return Err(format!(
            "output of {} chars is below the {}-char minimum",
            trimmed.len(),
            min_chars
        ));
    }
    let opening = trimmed
        .get(..trimmed.len().min(300))
        .unwrap_or(trimmed)
        .to_lowercase();
    for marker in REFUSAL_MARKERS {
        if opening.contains(marker) {
            return Err(format!("refusal marker '{}' present", marker));
        }
    }
    Ok(())
}

/// A [`ChunkWorker`](crate::enhance::ChunkWorker) that runs the work
/// unit in the calling process
///
/// The subprocess entry point and the test suites use this directly;
/// production runs wrap it in an OS process per chunk.
#[derive(Clone, Debug)]
pub struct InProcessWorker {
    pub ctx: WorkerContext,
}

#[async_trait::async_trait]
impl crate::enhance::ChunkWorker for InProcessWorker {
    async fn run(&self, chunk: &Chunk, output_dir: &Path) -> Result<()> {
        enhance_chunk(&self.ctx, chunk, output_dir).await.map(|_| ())
    }
}

/// Entry point for the `enhance-worker` subprocess
///
/// Loads the chunk set from the Stage 3 cache artifact, enhances the
/// requested chunk, and writes the per-chunk artifact. Any error short
/// of a failed artifact write is itself converted into a failure
/// artifact so the engine's scan sees a definitive outcome.
pub async fn run_worker_entry(
    cache_dir: &Path,
    fingerprint: &str,
    chunk_id: u32,
    provider_name: &str,
    output_dir: &Path,
    config: &SkillsmithConfig,
) -> Result<()> {
    let outcome = run_worker_inner(
        cache_dir,
        fingerprint,
        chunk_id,
        provider_name,
        output_dir,
        config,
    )
    .await;

    if let Err(e) = &outcome {
        let artifact = EnhancedChunk {
            chunk_id,
            title: String::new(),
            slug: String::new(),
            enhanced_content: String::new(),
            enhanced_at: Utc::now(),
            provider: provider_name.to_string(),
            status: ChunkStatus::Failed,
            token_count: 0,
            error: Some(format!("{}: {}", e.kind(), e)),
        };
        let path = output_dir.join(artifact_file_name(chunk_id));
        if let Err(write_err) = fsutil::write_atomic_json(&path, &artifact).await {
            warn!(
                "Could not record failure artifact for chunk {}: {}",
                chunk_id, write_err
            );
        }
    }
    outcome
}

async fn run_worker_inner(
    cache_dir: &Path,
    fingerprint: &str,
    chunk_id: u32,
    provider_name: &str,
    output_dir: &Path,
    config: &SkillsmithConfig,
) -> Result<()> {
    let cache = CacheManager::new(cache_dir);
    let chunks: Vec<Chunk> = cache
        .load(STAGE_CHUNKS, fingerprint)
        .await?
        .ok_or_else(|| {
            SkillsmithError::pipeline(format!(
                "no chunks artifact for fingerprint {}",
                fingerprint
            ))
        })?;

    let chunk = chunks
        .into_iter()
        .find(|c| c.id == chunk_id)
        .ok_or_else(|| {
            SkillsmithError::pipeline(format!("chunk {} not in chunk set", chunk_id))
        })?;

    let registry = ProviderRegistry::new(config.provider_options.clone());
    let provider = registry.resolve(provider_name)?;
    let ctx = WorkerContext::new(provider, config);

    enhance_chunk(&ctx, &chunk, output_dir).await.map(|_| ())
}

/// Build the argument vector for spawning a worker subprocess
pub fn worker_args(
    cache_dir: &Path,
    fingerprint: &str,
    chunk_id: u32,
    provider_name: &str,
    output_dir: &Path,
    config_file: Option<&PathBuf>,
) -> Vec<String> {
    let mut args = vec![
        "enhance-worker".to_string(),
        "--cache-dir".to_string(),
        cache_dir.display().to_string(),
        "--fingerprint".to_string(),
        fingerprint.to_string(),
        "--chunk-id".to_string(),
        chunk_id.to_string(),
        "--provider".to_string(),
        provider_name.to_string(),
        "--output-dir".to_string(),
        output_dir.display().to_string(),
    ];
    if let Some(path) = config_file {
        args.push("--config".to_string());
        args.push(path.display().to_string());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Debug)]
    struct StubProvider {
        response: std::result::Result<String, String>,
        max_chars: usize,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }
        async fn probe(&self) -> std::result::Result<(), ProviderError> {
            Ok(())
        }
        fn max_prompt_chars(&self) -> usize {
            self.max_chars
        }
        fn timeout_for(&self, _prompt_chars: usize) -> Duration {
            Duration::from_secs(1)
        }
        async fn invoke_with_timeout(
            &self,
            _prompt: &str,
            _timeout: Duration,
        ) -> std::result::Result<String, ProviderError> {
            self.response.clone().map_err(ProviderError::Api)
        }
    }

    fn ctx(provider: StubProvider) -> WorkerContext {
        WorkerContext {
            provider: Arc::new(provider),
            templates: PromptTemplates::default(),
            min_enhanced_chars: 50,
        }
    }

    fn chunk(id: u32, text: &str) -> Chunk {
        Chunk {
            id,
            chapter_number: id,
            title: format!("Chapter {}", id),
            slug: format!("chapter-{}", id),
            text: text.to_string(),
            char_count: text.len(),
        }
    }

    #[tokio::test]
    async fn test_successful_enhancement_writes_completed_artifact() {
        let dir = TempDir::new().unwrap();
        let content = format!("# Chapter 1\n\n{}", "Useful tax guidance. ".repeat(10));
        let ctx = ctx(StubProvider {
            response: Ok(content.clone()),
            max_chars: 100_000,
        });

        let artifact = enhance_chunk(&ctx, &chunk(1, "source text"), dir.path())
            .await
            .unwrap();
        assert_eq!(artifact.status, ChunkStatus::Completed);
        assert_eq!(artifact.enhanced_content, content);
        assert!(artifact.token_count > 0);

        let on_disk: EnhancedChunk = serde_json::from_slice(
            &std::fs::read(dir.path().join("chunk-001.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(on_disk.chunk_id, 1);
        assert_eq!(on_disk.status, ChunkStatus::Completed);
    }

    #[tokio::test]
    async fn test_provider_error_writes_failed_artifact() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(StubProvider {
            response: Err("quota".to_string()),
            max_chars: 100_000,
        });

        let artifact = enhance_chunk(&ctx, &chunk(2, "text"), dir.path())
            .await
            .unwrap();
        assert_eq!(artifact.status, ChunkStatus::Failed);
        let error = artifact.error.unwrap();
        assert!(error.starts_with("provider-api-error"));
        assert!(dir.path().join("chunk-002.json").exists());
    }

    #[tokio::test]
    async fn test_oversized_chunk_fails_without_invocation() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(StubProvider {
            // Invoking would succeed; the guard must reject first
            response: Ok("x".repeat(100)),
            max_chars: 10,
        });

        let artifact = enhance_chunk(&ctx, &chunk(3, "a text longer than ten"), dir.path())
            .await
            .unwrap();
        assert_eq!(artifact.status, ChunkStatus::Failed);
        assert!(artifact.error.unwrap().starts_with("invalid-response"));
    }

    #[tokio::test]
    async fn test_short_output_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(StubProvider {
            response: Ok("too short".to_string()),
            max_chars: 100_000,
        });

        let artifact = enhance_chunk(&ctx, &chunk(4, "text"), dir.path())
            .await
            .unwrap();
        assert_eq!(artifact.status, ChunkStatus::Failed);
    }

    #[tokio::test]
    async fn test_refusal_marker_rejected() {
        let dir = TempDir::new().unwrap();
        let refusal = format!(
            "I cannot assist with that request. {}",
            "padding ".repeat(20)
        );
        let ctx = ctx(StubProvider {
            response: Ok(refusal),
            max_chars: 100_000,
        });

        let artifact = enhance_chunk(&ctx, &chunk(5, "text"), dir.path())
            .await
            .unwrap();
        assert_eq!(artifact.status, ChunkStatus::Failed);
        assert!(artifact.error.unwrap().contains("refusal"));
    }

    #[tokio::test]
    async fn test_enhancement_is_idempotent_on_artifact_name() {
        let dir = TempDir::new().unwrap();
        let content = "Good content. ".repeat(10);
        let ctx = ctx(StubProvider {
            response: Ok(content),
            max_chars: 100_000,
        });

        enhance_chunk(&ctx, &chunk(7, "text"), dir.path())
            .await
            .unwrap();
        enhance_chunk(&ctx, &chunk(7, "text"), dir.path())
            .await
            .unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec!["chunk-007.json".to_string()]);
    }

    #[test]
    fn test_artifact_file_name_zero_padding() {
        assert_eq!(artifact_file_name(1), "chunk-001.json");
        assert_eq!(artifact_file_name(42), "chunk-042.json");
        assert_eq!(artifact_file_name(1000), "chunk-1000.json");
    }

    #[test]
    fn test_worker_args_shape() {
        let args = worker_args(
            Path::new("/tmp/cache"),
            "0123456789abcdef",
            7,
            "glm",
            Path::new("/tmp/out"),
            None,
        );
        assert_eq!(args[0], "enhance-worker");
        assert!(args.windows(2).any(|w| w == ["--chunk-id", "7"]));
        assert!(!args.contains(&"--config".to_string()));
    }
}
