//! End-to-end pipeline scenarios with a stubbed provider
//!
//! Stage 1 is seeded through the cache (parsing a real PDF is the
//! extractor's own concern); everything downstream runs for real with
//! an in-process worker and a scripted provider.

use async_trait::async_trait;
use skillsmith_core::cache::{CacheManager, STAGE_EXTRACTION};
use skillsmith_core::enhance::{ChunkWorker, InProcessWorker, WorkerContext};
use skillsmith_core::pipeline::{Pipeline, PipelineOptions, StageStatus};
use skillsmith_core::prompts::PromptTemplates;
use skillsmith_core::providers::{Provider, ProviderError};
use skillsmith_core::types::{ExtractionRecord, PageText};
use skillsmith_core::SkillsmithConfig;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Scripted provider: enhancement output for chunk prompts, a valid
/// index for the Stage 6 prompt, failures on request
#[derive(Debug)]
struct StubProvider {
    available: bool,
    fail_markers: Vec<String>,
    index_response: String,
    calls: AtomicUsize,
}

impl StubProvider {
    fn healthy() -> Self {
        Self {
            available: true,
            fail_markers: Vec::new(),
            index_response: good_index(),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing_chunk(marker: &str) -> Self {
        Self {
            fail_markers: vec![marker.to_string()],
            ..Self::healthy()
        }
    }

    fn bad_index() -> Self {
        Self {
            index_response: "# Not a real index".to_string(),
            ..Self::healthy()
        }
    }

    fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::healthy()
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn good_index() -> String {
    format!(
        "# Deductions Skill\n\n## When to Use\n\nFiling a T1 return with deductions.\n\n\
         ## Quick Reference\n\n```text\nLine 21400: child care\n```\n\n\
         ```text\nSchedule 11: tuition\n```\n\n\
         ## Reference Documentation\n\nOne file per chapter.\n\n{}",
        "Prose about T4 slips and thresholds. ".repeat(30)
    )
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }
    async fn probe(&self) -> Result<(), ProviderError> {
        if self.available {
            Ok(())
        } else {
            Err(ProviderError::Unavailable("stub offline".to_string()))
        }
    }
    fn max_prompt_chars(&self) -> usize {
        1_000_000
    }
    fn timeout_for(&self, _prompt_chars: usize) -> Duration {
        Duration::from_secs(1)
    }
    async fn invoke_with_timeout(
        &self,
        prompt: &str,
        _timeout: Duration,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("Current index:") {
            return Ok(self.index_response.clone());
        }
        if self.fail_markers.iter().any(|m| prompt.contains(m)) {
            return Err(ProviderError::Timeout(1));
        }
        Ok(format!(
            "# Enhanced chapter\n\n{}",
            "Clear guidance about the T1 return. ".repeat(10)
        ))
    }
}

struct Harness {
    _dirs: TempDir,
    config: SkillsmithConfig,
    pdf_path: PathBuf,
    fingerprint: String,
}

/// Seed a fake PDF plus its extraction artifact so Stage 1 cache-hits
async fn harness() -> Harness {
    let dirs = TempDir::new().unwrap();
    let pdf_path = dirs.path().join("t1-general-guide.pdf");
    let pdf_bytes = b"fake pdf bytes for fingerprinting".to_vec();
    tokio::fs::write(&pdf_path, &pdf_bytes).await.unwrap();
    let fp = skillsmith_core::fingerprint(&pdf_bytes);

    let mut config = SkillsmithConfig::default();
    config.cache_dir = dirs.path().join("cache");
    config.output_dir = dirs.path().join("skills");
    config.skill.min_index_chars = 200;

    let filler = "Deduction rules and eligible amounts explained at length. ".repeat(12);
    let pages = vec![
        PageText::new(1, format!("Chapter 1: Moving Expenses\n{}", filler)),
        PageText::new(2, format!("Chapter 2: Child Care\n{}", filler)),
        PageText::new(3, format!("Chapter 3: Union Dues\n{}", filler)),
    ];
    let full_text = pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let extraction = ExtractionRecord {
        source_path: pdf_path.clone(),
        fingerprint: fp.clone(),
        total_pages: 3,
        full_text,
        pages,
    };

    let cache = CacheManager::new(&config.cache_dir);
    cache
        .store(STAGE_EXTRACTION, &fp, serde_json::Value::Null, &extraction)
        .await
        .unwrap();

    Harness {
        _dirs: dirs,
        config,
        pdf_path,
        fingerprint: fp,
    }
}

fn pipeline_with(
    harness: &Harness,
    provider: Arc<StubProvider>,
    options: PipelineOptions,
) -> Pipeline {
    let worker: Arc<dyn ChunkWorker> = Arc::new(InProcessWorker {
        ctx: WorkerContext {
            provider: provider.clone(),
            templates: PromptTemplates::default(),
            min_enhanced_chars: harness.config.enhancement.min_enhanced_chars,
        },
    });
    Pipeline::with_overrides(harness.config.clone(), options, provider, worker)
}

fn stage_status(summary: &skillsmith_core::RunSummary, stage: &str) -> StageStatus {
    summary
        .stages
        .iter()
        .find(|s| s.stage == stage)
        .unwrap_or_else(|| panic!("no report for stage {}", stage))
        .status
}

fn collect_files(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<(String, Vec<u8>)> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            (rel, std::fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}

#[tokio::test]
async fn cold_run_builds_complete_skill_directory() {
    let h = harness().await;
    let provider = Arc::new(StubProvider::healthy());
    let pipeline = pipeline_with(&h, provider.clone(), PipelineOptions::default());

    let summary = pipeline.run(&h.pdf_path).await.unwrap();
    assert!(summary.succeeded(), "error: {:?}", summary.error);

    assert_eq!(stage_status(&summary, "extract"), StageStatus::Cached);
    assert_eq!(stage_status(&summary, "classify"), StageStatus::Ran);
    assert_eq!(stage_status(&summary, "chunk"), StageStatus::Ran);
    assert_eq!(stage_status(&summary, "enhance"), StageStatus::Ran);
    assert_eq!(stage_status(&summary, "assemble"), StageStatus::Ran);
    assert_eq!(stage_status(&summary, "enhance-skill"), StageStatus::Ran);

    let root = summary.output_dir.unwrap();
    assert!(root.join("SKILL.md").exists());
    assert!(!root.join("SKILL.md.backup").exists());
    assert!(root.join("raw/full-extract.txt").exists());
    assert!(root.join("references/index.md").exists());

    let references: Vec<String> = std::fs::read_dir(root.join("references"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("chunk-"))
        .collect();
    assert_eq!(references.len(), 3);

    let index = std::fs::read_to_string(root.join("SKILL.md")).unwrap();
    assert!(index.contains("When to Use"));
}

#[tokio::test]
async fn warm_run_is_pure_cache_hit() {
    let h = harness().await;
    let provider = Arc::new(StubProvider::healthy());
    let pipeline = pipeline_with(&h, provider.clone(), PipelineOptions::default());

    let first = pipeline.run(&h.pdf_path).await.unwrap();
    assert!(first.succeeded());
    let root = first.output_dir.clone().unwrap();
    let before = collect_files(&root);
    let calls_after_first = provider.call_count();

    let second = pipeline.run(&h.pdf_path).await.unwrap();
    assert!(second.succeeded());

    for stage in ["extract", "classify", "chunk", "enhance", "assemble", "enhance-skill"] {
        assert_eq!(
            stage_status(&second, stage),
            StageStatus::Cached,
            "stage {} not cached",
            stage
        );
    }
    // No provider invocation on the warm run
    assert_eq!(provider.call_count(), calls_after_first);
    // Directory contents unchanged byte for byte
    assert_eq!(collect_files(&root), before);
}

#[tokio::test]
async fn failed_chunk_stops_pipeline_then_retry_recovers() {
    let h = harness().await;
    let provider = Arc::new(StubProvider::failing_chunk("Chapter 2"));
    let pipeline = pipeline_with(&h, provider.clone(), PipelineOptions::default());

    let summary = pipeline.run(&h.pdf_path).await.unwrap();
    assert!(!summary.succeeded());
    assert_eq!(stage_status(&summary, "enhance"), StageStatus::Failed);
    let error = summary.error.unwrap();
    assert!(error.contains("chunk 2"));
    assert!(error.contains("--retry-failed"));
    // Downstream stages did not run
    assert!(summary.stages.iter().all(|s| s.stage != "assemble"));

    // A healthy provider with --retry-failed completes the run
    let healthy = Arc::new(StubProvider::healthy());
    let retry = pipeline_with(
        &h,
        healthy.clone(),
        PipelineOptions {
            retry_failed: true,
            ..Default::default()
        },
    );
    let summary = retry.run(&h.pdf_path).await.unwrap();
    assert!(summary.succeeded(), "error: {:?}", summary.error);
    // One retried chunk, one index enhancement; completed chunks reused
    assert_eq!(healthy.call_count(), 2);
}

#[tokio::test]
async fn partial_state_without_flags_reports_partial_progress() {
    let h = harness().await;
    let provider = Arc::new(StubProvider::failing_chunk("Chapter 2"));
    let pipeline = pipeline_with(&h, provider.clone(), PipelineOptions::default());
    pipeline.run(&h.pdf_path).await.unwrap();

    // Second run without --resume/--retry-failed refuses to touch the
    // partial state
    let again = pipeline_with(&h, Arc::new(StubProvider::healthy()), PipelineOptions::default());
    let summary = again.run(&h.pdf_path).await.unwrap();
    assert!(!summary.succeeded());
    assert!(summary.error.unwrap().contains("partial-progress"));
}

#[tokio::test]
async fn resume_converges_after_interrupt() {
    let h = harness().await;
    // First run fails one chunk, leaving partial artifacts behind
    let flaky = Arc::new(StubProvider::failing_chunk("Chapter 3"));
    pipeline_with(&h, flaky, PipelineOptions::default())
        .run(&h.pdf_path)
        .await
        .unwrap();

    // Resume with retry completes and the final state matches a clean run
    let healthy = Arc::new(StubProvider::healthy());
    let summary = pipeline_with(
        &h,
        healthy,
        PipelineOptions {
            resume: true,
            retry_failed: true,
            ..Default::default()
        },
    )
    .run(&h.pdf_path)
    .await
    .unwrap();
    assert!(summary.succeeded(), "error: {:?}", summary.error);

    let progress = skillsmith_core::EnhancementProgress::load(
        &CacheManager::new(&h.config.cache_dir).enhanced_chunks_dir(&h.fingerprint),
    )
    .await
    .unwrap();
    assert!(progress.is_complete());
    assert_eq!(progress.completed_chunks.len(), 3);
}

#[tokio::test]
async fn invalid_index_removes_skill_md_and_fails() {
    let h = harness().await;
    let provider = Arc::new(StubProvider::bad_index());
    let pipeline = pipeline_with(&h, provider, PipelineOptions::default());

    let summary = pipeline.run(&h.pdf_path).await.unwrap();
    assert!(!summary.succeeded());
    assert_eq!(stage_status(&summary, "enhance-skill"), StageStatus::Failed);
    assert!(summary.error.unwrap().contains("validation-failed"));

    let root = summary.output_dir.unwrap();
    // High-quality index or none at all
    assert!(!root.join("SKILL.md").exists());
    assert!(root.join("SKILL.md.backup").exists());
    // References and raw text stay in place
    assert!(root.join("raw/full-extract.txt").exists());
}

#[tokio::test]
async fn unavailable_provider_refuses_enhancement() {
    let h = harness().await;
    let provider = Arc::new(StubProvider::unavailable());
    let pipeline = pipeline_with(&h, provider.clone(), PipelineOptions::default());

    let summary = pipeline.run(&h.pdf_path).await.unwrap();
    assert!(!summary.succeeded());
    assert_eq!(stage_status(&summary, "enhance"), StageStatus::Failed);
    assert!(summary.error.unwrap().contains("provider-unavailable"));

    // No per-chunk artifacts were written
    let enhanced_dir =
        CacheManager::new(&h.config.cache_dir).enhanced_chunks_dir(&h.fingerprint);
    let chunk_artifacts = std::fs::read_dir(&enhanced_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with("chunk-"))
                .count()
        })
        .unwrap_or(0);
    assert_eq!(chunk_artifacts, 0);
}

#[tokio::test]
async fn opt_out_skips_index_enhancement_and_marks_basic() {
    let h = harness().await;
    let provider = Arc::new(StubProvider::healthy());
    let pipeline = pipeline_with(
        &h,
        provider.clone(),
        PipelineOptions {
            enhance_skill: false,
            ..Default::default()
        },
    );

    let summary = pipeline.run(&h.pdf_path).await.unwrap();
    assert!(summary.succeeded());
    assert!(summary.basic_quality);
    assert_eq!(stage_status(&summary, "enhance-skill"), StageStatus::Skipped);

    // The basic index is still on disk
    let root = summary.output_dir.unwrap();
    let index = std::fs::read_to_string(root.join("SKILL.md")).unwrap();
    assert!(index.starts_with("---\n"));
}

#[tokio::test]
async fn force_reruns_every_stage() {
    let h = harness().await;
    let provider = Arc::new(StubProvider::healthy());
    pipeline_with(&h, provider, PipelineOptions::default())
        .run(&h.pdf_path)
        .await
        .unwrap();

    // force invalidates the fingerprint, so extraction must re-run,
    // which against fake PDF bytes fails with extraction-failed
    let forced = pipeline_with(
        &h,
        Arc::new(StubProvider::healthy()),
        PipelineOptions {
            force: true,
            ..Default::default()
        },
    );
    let summary = forced.run(&h.pdf_path).await.unwrap();
    assert!(!summary.succeeded());
    assert!(summary.error.unwrap().contains("extraction-failed"));
}
