//! Stage 4 engine: scheduling, resume semantics and progress collection
//!
//! The engine is the single producer; workers run in separate OS
//! processes and share nothing in memory. Coordination happens entirely
//! through the enhanced-chunks directory: workers write per-chunk
//! artifacts, the engine scans them and maintains the progress record.

use crate::enhance::progress::EnhancementProgress;
use crate::enhance::worker::artifact_file_name;
use crate::error::{Result, SkillsmithError};
use crate::fsutil;
use crate::providers::Provider;
use crate::types::{Chunk, ChunkStatus, EnhancedChunk};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Bounds on the worker pool size
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 8;

/// Engine configuration for one run
#[derive(Debug, Clone)]
pub struct EnhancementEngineConfig {
    /// Worker process count, clamped to [1, 8]
    pub workers: usize,
    /// Dispatch only chunks absent from completed and failed sets
    pub resume: bool,
    /// Re-dispatch failed chunks
    pub retry_failed: bool,
    /// Validity floor for enhanced content
    pub min_enhanced_chars: usize,
}

impl Default for EnhancementEngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            resume: false,
            retry_failed: false,
            min_enhanced_chars: 50,
        }
    }
}

/// Seam between the engine and the per-chunk work unit
///
/// Production uses [`SubprocessWorker`]; tests use
/// [`InProcessWorker`](crate::enhance::InProcessWorker) with a stubbed
/// provider. A worker must leave an artifact file behind on success and
/// on handled failure; the engine treats a missing artifact as a crash.
#[async_trait]
pub trait ChunkWorker: Send + Sync + std::fmt::Debug {
    /// Process one chunk, writing its artifact into `output_dir`
    async fn run(&self, chunk: &Chunk, output_dir: &Path) -> Result<()>;
}

/// Spawns one OS process per chunk via the hidden `enhance-worker`
/// subcommand
///
/// Workers must hold no memory in common with the engine; provider
/// invocations may spawn CLI subprocesses of their own.
#[derive(Debug, Clone)]
pub struct SubprocessWorker {
    /// Binary to spawn; normally the current executable
    pub program: PathBuf,
    /// Cache directory holding the Stage 3 chunks artifact
    pub cache_dir: PathBuf,
    /// Fingerprint of the PDF being processed
    pub fingerprint: String,
    /// Provider the worker should resolve
    pub provider_name: String,
    /// Optional configuration file forwarded to the worker
    pub config_file: Option<PathBuf>,
}

#[async_trait]
impl ChunkWorker for SubprocessWorker {
    async fn run(&self, chunk: &Chunk, output_dir: &Path) -> Result<()> {
        let args = crate::enhance::worker::worker_args(
            &self.cache_dir,
            &self.fingerprint,
            chunk.id,
            &self.provider_name,
            output_dir,
            self.config_file.as_ref(),
        );
        debug!("Spawning worker process for chunk {}", chunk.id);
        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| {
                SkillsmithError::pipeline(format!(
                    "failed to spawn worker for chunk {}: {}",
                    chunk.id, e
                ))
            })?;

        if !status.success() {
            return Err(SkillsmithError::pipeline(format!(
                "worker for chunk {} exited with {}",
                chunk.id, status
            )));
        }
        Ok(())
    }
}

/// Stage 4 orchestrating engine
pub struct EnhancementEngine {
    config: EnhancementEngineConfig,
    cancel: Arc<AtomicBool>,
}

impl EnhancementEngine {
    /// Create an engine for one run
    pub fn new(config: EnhancementEngineConfig) -> Self {
        Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops dispatch of new work when set
    ///
    /// In-flight workers always finish their current chunk so partial
    /// progress is never lost.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Run enhancement over a chunk set
    ///
    /// Returns the final progress record. The caller decides stage
    /// success from it: the stage succeeds iff every chunk completed.
    pub async fn run(
        &self,
        chunks: &[Chunk],
        provider: Arc<dyn Provider>,
        worker: Arc<dyn ChunkWorker>,
        output_dir: &Path,
    ) -> Result<EnhancementProgress> {
        if let Err(e) = provider.probe().await {
            // No point dispatching anything against a dead backend
            return Err(e.into_pipeline_error(provider.name()));
        }
        fsutil::ensure_dir(output_dir).await?;

        let mut progress = EnhancementProgress::rebuild_from_artifacts(
            output_dir,
            chunks.len(),
            provider.name(),
            self.config.min_enhanced_chars,
        )
        .await?;

        if progress.is_complete() {
            info!(
                "All {} chunks already enhanced; nothing to dispatch",
                progress.total_chunks
            );
            return Ok(progress);
        }

        if progress.is_partial() && !self.config.resume && !self.config.retry_failed {
            return Err(SkillsmithError::PartialProgress {
                completed: progress.completed_chunks.len(),
                failed: progress.failed_chunks.len(),
                total: progress.total_chunks,
            });
        }

        let failed_ids = progress.failed_ids();
        let to_dispatch: Vec<Chunk> = chunks
            .iter()
            .filter(|c| !progress.completed_chunks.contains(&c.id))
            .filter(|c| self.config.retry_failed || !failed_ids.contains(&c.id))
            .cloned()
            .collect();

        let worker_count = self.config.workers.clamp(MIN_WORKERS, MAX_WORKERS);
        info!(
            "Dispatching {} of {} chunks across {} workers via {}",
            to_dispatch.len(),
            chunks.len(),
            worker_count,
            provider.name()
        );

        let mut queue = to_dispatch.into_iter();
        let mut join_set: JoinSet<(u32, f64, Result<()>)> = JoinSet::new();

        loop {
            while join_set.len() < worker_count && !self.cancelled() {
                let Some(chunk) = queue.next() else { break };
                let worker = Arc::clone(&worker);
                let out = output_dir.to_path_buf();
                join_set.spawn(async move {
                    let start = Instant::now();
                    let outcome = worker.run(&chunk, &out).await;
                    (chunk.id, start.elapsed().as_secs_f64(), outcome)
                });
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let (chunk_id, seconds, outcome) = joined
                .map_err(|e| SkillsmithError::pipeline(format!("worker task panicked: {}", e)))?;
            self.collect(&mut progress, output_dir, chunk_id, seconds, outcome)
                .await;
            progress.save(output_dir).await?;
        }

        if self.cancelled() {
            warn!(
                "Enhancement cancelled; {} completed, {} failed of {}",
                progress.completed_chunks.len(),
                progress.failed_chunks.len(),
                progress.total_chunks
            );
        }

        progress.check_invariants()?;
        progress.save(output_dir).await?;
        Ok(progress)
    }

    /// Fold one worker result into the progress record
    ///
    /// The artifact file on disk is authoritative; the worker's return
    /// value only matters when no artifact exists (a crash).
    async fn collect(
        &self,
        progress: &mut EnhancementProgress,
        output_dir: &Path,
        chunk_id: u32,
        seconds: f64,
        outcome: Result<()>,
    ) {
        let path = output_dir.join(artifact_file_name(chunk_id));
        let artifact: Option<EnhancedChunk> = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw).ok(),
            Err(_) => None,
        };

        match artifact {
            Some(chunk) if chunk.status == ChunkStatus::Completed => {
                if chunk.is_valid(self.config.min_enhanced_chars) {
                    debug!("Chunk {} completed in {:.1}s", chunk_id, seconds);
                    progress.record_completed(chunk_id, seconds);
                } else {
                    progress.record_failed(
                        chunk_id,
                        "invalid-response: enhanced content below minimum length",
                    );
                }
            }
            Some(chunk) => {
                let message = chunk.error.unwrap_or_else(|| "unknown failure".to_string());
                error!("Chunk {} failed: {}", chunk_id, message);
                progress.record_failed(chunk_id, &message);
            }
            None => {
                let message = match outcome {
                    Ok(()) => "worker exited without writing an artifact".to_string(),
                    Err(e) => format!("worker crashed: {}", e),
                };
                error!("Chunk {}: {}", chunk_id, message);
                progress.record_failed(chunk_id, &message);
            }
        }
    }
}

/// Convert a finished progress record into a stage verdict
///
/// Names the failed chunks and the remediation in the error message.
pub fn ensure_enhancement_complete(progress: &EnhancementProgress) -> Result<()> {
    if progress.is_complete() {
        return Ok(());
    }
    let failed: Vec<String> = progress
        .failed_chunks
        .iter()
        .map(|f| format!("chunk {} ({})", f.chunk_id, f.error))
        .collect();
    Err(SkillsmithError::pipeline(format!(
        "enhancement incomplete: {} of {} completed; failed: [{}]; retry with --retry-failed",
        progress.completed_chunks.len(),
        progress.total_chunks,
        failed.join(", ")
    )))
}
