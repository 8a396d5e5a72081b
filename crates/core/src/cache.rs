//! Content-addressed cache for stage artifacts
//!
//! The cache maps `(stage, fingerprint)` to a JSON artifact on disk.
//! Stages 1-3 store single files named `<stage>_<fingerprint>.json` in a
//! flat directory; Stage 4 owns a directory `enhanced_chunks_<fingerprint>/`
//! whose layout is managed by the enhancement engine. Writes are atomic
//! (write-temp-then-rename), so lookups never observe partial artifacts.
//!
//! Lookups are side-effect-free. Two concurrent writers for the same key
//! within one process are forbidden by construction: each stage runs once
//! per pipeline and the enhancement engine shards by chunk id.

use crate::error::{Result, SkillsmithError};
use crate::fsutil;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info, warn};

/// Stage name for extraction artifacts
pub const STAGE_EXTRACTION: &str = "extraction";
/// Stage name for classification artifacts
pub const STAGE_CLASSIFICATION: &str = "classification";
/// Stage name for chunk-set artifacts
pub const STAGE_CHUNKS: &str = "chunks";

/// Outer schema shared by all single-file artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEnvelope<T> {
    /// Producing stage name
    pub stage: String,
    /// Fingerprint the artifact is keyed by
    pub content_hash: String,
    /// When the artifact was stored
    pub timestamp: DateTime<Utc>,
    /// Free-form stage metadata (page counts, source path, ...)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    /// The stage's record, per the pipeline data model
    pub data: T,
}

/// File-backed cache manager for pipeline artifacts
#[derive(Debug, Clone)]
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    /// Create a cache manager rooted at `cache_dir`
    ///
    /// The directory is created lazily on the first store.
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }

    /// Root directory of the cache
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of a single-file artifact for `(stage, fingerprint)`
    pub fn artifact_path(&self, stage: &str, fingerprint: &str) -> PathBuf {
        self.cache_dir.join(format!("{}_{}.json", stage, fingerprint))
    }

    /// Directory holding Stage 4 per-chunk artifacts for a fingerprint
    pub fn enhanced_chunks_dir(&self, fingerprint: &str) -> PathBuf {
        self.cache_dir.join(format!("enhanced_chunks_{}", fingerprint))
    }

    /// Check whether an artifact exists for `(stage, fingerprint)`
    pub fn contains(&self, stage: &str, fingerprint: &str) -> bool {
        self.artifact_path(stage, fingerprint).exists()
    }

    /// Load an artifact, verifying the envelope against the request
    ///
    /// Returns `Ok(None)` when no artifact exists. A present artifact
    /// whose envelope names a different stage or fingerprint, or that
    /// fails to parse, is a `cache-mismatch` error rather than a miss:
    /// silently re-running the stage would hide cache corruption.
    pub async fn load<T: DeserializeOwned>(
        &self,
        stage: &str,
        fingerprint: &str,
    ) -> Result<Option<T>> {
        let path = self.artifact_path(stage, fingerprint);
        if !path.exists() {
            debug!("Cache miss for {}_{}", stage, fingerprint);
            return Ok(None);
        }

        let raw = fs::read(&path).await?;
        let envelope: ArtifactEnvelope<T> = serde_json::from_slice(&raw).map_err(|e| {
            SkillsmithError::cache_mismatch(
                path.display().to_string(),
                format!("failed to parse artifact: {}", e),
            )
        })?;

        if envelope.stage != stage {
            return Err(SkillsmithError::cache_mismatch(
                path.display().to_string(),
                format!("expected stage '{}', found '{}'", stage, envelope.stage),
            ));
        }
        if envelope.content_hash != fingerprint {
            return Err(SkillsmithError::cache_mismatch(
                path.display().to_string(),
                format!(
                    "expected fingerprint '{}', found '{}'",
                    fingerprint, envelope.content_hash
                ),
            ));
        }

        debug!("Cache hit for {}_{}", stage, fingerprint);
        Ok(Some(envelope.data))
    }

    /// Store an artifact atomically and return its path
    pub async fn store<T: Serialize>(
        &self,
        stage: &str,
        fingerprint: &str,
        metadata: serde_json::Value,
        data: &T,
    ) -> Result<PathBuf> {
        let envelope = ArtifactEnvelope {
            stage: stage.to_string(),
            content_hash: fingerprint.to_string(),
            timestamp: Utc::now(),
            metadata,
            data,
        };
        let path = self.artifact_path(stage, fingerprint);
        fsutil::write_atomic_json(&path, &envelope).await?;
        debug!("Stored {} artifact at {}", stage, path.display());
        Ok(path)
    }

    /// Remove every artifact for one fingerprint
    ///
    /// Returns the number of removed entries (files plus the enhanced
    /// chunks directory, counted as one).
    pub async fn invalidate_fingerprint(&self, fingerprint: &str) -> Result<usize> {
        let mut removed = 0;
        for stage in [STAGE_EXTRACTION, STAGE_CLASSIFICATION, STAGE_CHUNKS] {
            let path = self.artifact_path(stage, fingerprint);
            if path.exists() {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        let enhanced = self.enhanced_chunks_dir(fingerprint);
        if enhanced.exists() {
            fs::remove_dir_all(&enhanced).await?;
            removed += 1;
        }
        info!(
            "Invalidated {} cache entr{} for {}",
            removed,
            if removed == 1 { "y" } else { "ies" },
            fingerprint
        );
        Ok(removed)
    }

    /// Remove every artifact older than `max_age`
    pub async fn invalidate_older_than(&self, max_age: Duration) -> Result<usize> {
        if !self.cache_dir.exists() {
            return Ok(0);
        }
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut removed = 0;
        for entry in walkdir::WalkDir::new(&self.cache_dir)
            .min_depth(1)
            .max_depth(1)
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable cache entry: {}", e);
                    continue;
                }
            };
            let modified = match entry.metadata() {
                Ok(meta) => match meta.modified() {
                    Ok(modified) => modified,
                    Err(_) => continue,
                },
                Err(_) => continue,
            };
            if modified >= cutoff {
                continue;
            }
            if entry.file_type().is_dir() {
                fs::remove_dir_all(entry.path()).await?;
            } else {
                fs::remove_file(entry.path()).await?;
            }
            removed += 1;
        }
        info!("Invalidated {} stale cache entries", removed);
        Ok(removed)
    }

    /// Summarize cache contents for status output
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        if !self.cache_dir.exists() {
            return stats;
        }
        for entry in walkdir::WalkDir::new(&self.cache_dir).min_depth(1) {
            let Ok(entry) = entry else { continue };
            if entry.file_type().is_file() {
                stats.total_files += 1;
                stats.total_size_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            } else if entry.depth() == 1 {
                stats.enhanced_chunk_dirs += 1;
            }
        }
        stats
    }
}

/// Cache statistics for status output
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub total_files: usize,
    pub enhanced_chunk_dirs: usize,
    pub total_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FP: &str = "0123456789abcdef";

    #[tokio::test]
    async fn test_store_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(dir.path());

        cache
            .store(STAGE_CHUNKS, FP, serde_json::Value::Null, &vec![1, 2, 3])
            .await
            .unwrap();

        let loaded: Option<Vec<i32>> = cache.load(STAGE_CHUNKS, FP).await.unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_load_miss_returns_none() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(dir.path());

        let loaded: Option<String> = cache.load(STAGE_EXTRACTION, FP).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_load_rejects_wrong_stage() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(dir.path());

        cache
            .store(STAGE_CHUNKS, FP, serde_json::Value::Null, &"data")
            .await
            .unwrap();
        // Copy the chunks artifact into the extraction slot to simulate
        // a corrupted cache directory.
        std::fs::copy(
            cache.artifact_path(STAGE_CHUNKS, FP),
            cache.artifact_path(STAGE_EXTRACTION, FP),
        )
        .unwrap();

        let err = cache
            .load::<String>(STAGE_EXTRACTION, FP)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "cache-mismatch");
    }

    #[tokio::test]
    async fn test_load_rejects_garbage_artifact() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(dir.path());
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(cache.artifact_path(STAGE_CHUNKS, FP), b"not json").unwrap();

        let err = cache.load::<String>(STAGE_CHUNKS, FP).await.unwrap_err();
        assert_eq!(err.kind(), "cache-mismatch");
    }

    #[tokio::test]
    async fn test_store_is_idempotent_on_contents() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(dir.path());

        cache
            .store(STAGE_CLASSIFICATION, FP, serde_json::Value::Null, &"v1")
            .await
            .unwrap();
        cache
            .store(STAGE_CLASSIFICATION, FP, serde_json::Value::Null, &"v2")
            .await
            .unwrap();

        let loaded: Option<String> = cache.load(STAGE_CLASSIFICATION, FP).await.unwrap();
        assert_eq!(loaded.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_invalidate_fingerprint() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(dir.path());

        cache
            .store(STAGE_EXTRACTION, FP, serde_json::Value::Null, &"a")
            .await
            .unwrap();
        cache
            .store(STAGE_CHUNKS, FP, serde_json::Value::Null, &"b")
            .await
            .unwrap();
        std::fs::create_dir_all(cache.enhanced_chunks_dir(FP)).unwrap();

        let removed = cache.invalidate_fingerprint(FP).await.unwrap();
        assert_eq!(removed, 3);
        assert!(!cache.contains(STAGE_EXTRACTION, FP));
        assert!(!cache.enhanced_chunks_dir(FP).exists());
    }

    #[tokio::test]
    async fn test_invalidate_older_than_keeps_fresh_entries() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(dir.path());

        cache
            .store(STAGE_EXTRACTION, FP, serde_json::Value::Null, &"fresh")
            .await
            .unwrap();

        let removed = cache
            .invalidate_older_than(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert!(cache.contains(STAGE_EXTRACTION, FP));
    }

    #[tokio::test]
    async fn test_stats_counts_files_and_dirs() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(dir.path());

        cache
            .store(STAGE_EXTRACTION, FP, serde_json::Value::Null, &"a")
            .await
            .unwrap();
        let enhanced = cache.enhanced_chunks_dir(FP);
        std::fs::create_dir_all(&enhanced).unwrap();
        std::fs::write(enhanced.join("chunk-001.json"), b"{}").unwrap();

        let stats = cache.stats();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.enhanced_chunk_dirs, 1);
        assert!(stats.total_size_bytes > 0);
    }
}
