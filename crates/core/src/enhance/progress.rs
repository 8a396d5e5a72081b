//! Enhancement progress record
//!
//! The only mutable record during a run, owned exclusively by the
//! engine. Workers never touch it: they signal completion by writing
//! their chunk artifact, and the engine folds results in. On start-up
//! the record is rebuilt by scanning artifact files, so it converges
//! after crashes and interrupts without any repair logic.

use crate::error::Result;
use crate::fsutil;
use crate::types::{ChunkStatus, EnhancedChunk};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

/// File name of the progress record inside the enhanced-chunks directory
pub const PROGRESS_FILE: &str = "progress.json";

/// Weight of the newest observation in the duration moving average
const EMA_ALPHA: f64 = 0.3;

/// One failed chunk with its last error
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedChunk {
    pub chunk_id: u32,
    pub error: String,
}

/// Per-PDF persistent progress for Stage 4
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementProgress {
    /// Number of chunks in the input set
    pub total_chunks: usize,
    /// Ids of chunks with a valid completed artifact
    pub completed_chunks: BTreeSet<u32>,
    /// Failed chunks with their last error
    pub failed_chunks: Vec<FailedChunk>,
    /// Provider identifier used for this run
    pub provider: String,
    /// When enhancement first started for this PDF
    pub started_at: DateTime<Utc>,
    /// Last progress update
    pub updated_at: DateTime<Utc>,
    /// Moving-average processing duration per chunk, in seconds
    pub avg_chunk_seconds: f64,
}

impl EnhancementProgress {
    /// Create an empty progress record
    pub fn new(total_chunks: usize, provider: &str) -> Self {
        let now = Utc::now();
        Self {
            total_chunks,
            completed_chunks: BTreeSet::new(),
            failed_chunks: Vec::new(),
            provider: provider.to_string(),
            started_at: now,
            updated_at: now,
            avg_chunk_seconds: 0.0,
        }
    }

    /// Ids currently recorded as failed
    pub fn failed_ids(&self) -> BTreeSet<u32> {
        self.failed_chunks.iter().map(|f| f.chunk_id).collect()
    }

    /// Record a chunk as completed, folding its duration into the average
    pub fn record_completed(&mut self, chunk_id: u32, duration_seconds: f64) {
        self.failed_chunks.retain(|f| f.chunk_id != chunk_id);
        self.completed_chunks.insert(chunk_id);
        self.avg_chunk_seconds = if self.avg_chunk_seconds == 0.0 {
            duration_seconds
        } else {
            EMA_ALPHA * duration_seconds + (1.0 - EMA_ALPHA) * self.avg_chunk_seconds
        };
        self.updated_at = Utc::now();
    }

    /// Record a chunk as failed with its last error
    pub fn record_failed(&mut self, chunk_id: u32, error: &str) {
        self.completed_chunks.remove(&chunk_id);
        self.failed_chunks.retain(|f| f.chunk_id != chunk_id);
        self.failed_chunks.push(FailedChunk {
            chunk_id,
            error: error.to_string(),
        });
        self.updated_at = Utc::now();
    }

    /// True when every chunk is completed and none failed
    pub fn is_complete(&self) -> bool {
        self.failed_chunks.is_empty() && self.completed_chunks.len() == self.total_chunks
    }

    /// True when some but not all work has been recorded
    pub fn is_partial(&self) -> bool {
        let seen = self.completed_chunks.len() + self.failed_chunks.len();
        seen > 0 && !self.is_complete()
    }

    /// Verify the record's invariants
    pub fn check_invariants(&self) -> Result<()> {
        let failed = self.failed_ids();
        if let Some(id) = self.completed_chunks.intersection(&failed).next() {
            return Err(crate::SkillsmithError::pipeline(format!(
                "chunk {} is both completed and failed",
                id
            )));
        }
        let seen = self.completed_chunks.len() + failed.len();
        if seen > self.total_chunks {
            return Err(crate::SkillsmithError::pipeline(format!(
                "{} chunks recorded but only {} exist",
                seen, self.total_chunks
            )));
        }
        Ok(())
    }

    /// Rebuild progress by scanning per-chunk artifact files
    ///
    /// The artifact files are authoritative; whatever the progress file
    /// said before is discarded except for `started_at`, which survives
    /// so elapsed-time reporting spans interrupted runs.
    pub async fn rebuild_from_artifacts(
        output_dir: &Path,
        total_chunks: usize,
        provider: &str,
        min_enhanced_chars: usize,
    ) -> Result<Self> {
        let mut progress = Self::new(total_chunks, provider);
        if let Some(previous) = Self::load(output_dir).await {
            progress.started_at = previous.started_at;
            progress.avg_chunk_seconds = previous.avg_chunk_seconds;
        }

        if !output_dir.exists() {
            return Ok(progress);
        }

        let mut entries = fs::read_dir(output_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with("chunk-") || !name.ends_with(".json") {
                continue;
            }
            let raw = match fs::read(entry.path()).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping unreadable artifact {}: {}", name, e);
                    continue;
                }
            };
            let chunk: EnhancedChunk = match serde_json::from_slice(&raw) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("Skipping malformed artifact {}: {}", name, e);
                    continue;
                }
            };

            match chunk.status {
                ChunkStatus::Completed if chunk.is_valid(min_enhanced_chars) => {
                    progress.completed_chunks.insert(chunk.chunk_id);
                }
                ChunkStatus::Completed => {
                    progress.record_failed(
                        chunk.chunk_id,
                        "invalid-response: enhanced content below minimum length",
                    );
                }
                ChunkStatus::Failed => {
                    let error = chunk.error.unwrap_or_else(|| "unknown failure".to_string());
                    progress.record_failed(chunk.chunk_id, &error);
                }
            }
        }

        debug!(
            "Rebuilt progress from artifacts: {} completed, {} failed of {}",
            progress.completed_chunks.len(),
            progress.failed_chunks.len(),
            progress.total_chunks
        );
        progress.check_invariants()?;
        Ok(progress)
    }

    /// Load the progress file if present and parseable
    pub async fn load(output_dir: &Path) -> Option<Self> {
        let path = output_dir.join(PROGRESS_FILE);
        let raw = fs::read(&path).await.ok()?;
        serde_json::from_slice(&raw).ok()
    }

    /// Persist the progress file atomically
    pub async fn save(&self, output_dir: &Path) -> Result<()> {
        fsutil::write_atomic_json(output_dir.join(PROGRESS_FILE), self).await
    }
}
