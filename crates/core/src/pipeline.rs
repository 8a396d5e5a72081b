//! Pipeline orchestrator
//!
//! Composes the six stages, gating each behind the cache manager. The
//! orchestrator constructs every collaborator and injects dependencies
//! downward; stages never reach for globals. The Stage 1 fingerprint is
//! computed once from the PDF bytes and reused as the cache key family
//! for the whole run.

use crate::cache::{CacheManager, STAGE_CHUNKS, STAGE_CLASSIFICATION, STAGE_EXTRACTION};
use crate::classify::Classifier;
use crate::chunker::Chunker;
use crate::config::SkillsmithConfig;
use crate::enhance::{
    engine::ensure_enhancement_complete, ChunkWorker, EnhancementEngine, EnhancementEngineConfig,
    EnhancementProgress, SubprocessWorker,
};
use crate::error::{Result, SkillsmithError};
use crate::extract::PdfExtractor;
use crate::hash::fingerprint;
use crate::providers::{Provider, ProviderRegistry};
use crate::skill::{SkillAssembler, SkillDirectory, SkillEnhancer, SkillValidator};
use crate::types::{Chunk, ClassificationRecord, EnhancedChunk, ExtractionRecord};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Per-run options, typically mapped from CLI flags
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Provider name resolved through the registry
    pub provider: String,
    /// Stage 4 worker process count
    pub workers: usize,
    /// Dispatch only chunks missing from prior progress
    pub resume: bool,
    /// Re-dispatch previously failed chunks
    pub retry_failed: bool,
    /// Ignore every cached artifact
    pub force: bool,
    /// Re-run extraction even on a cache hit
    pub force_extract: bool,
    /// Page cap for extraction
    pub max_pages: Option<usize>,
    /// Run the mandatory index enhancement (explicit opt-out only)
    pub enhance_skill: bool,
    /// Configuration file forwarded to worker processes
    pub config_file: Option<PathBuf>,
    /// Binary spawned as the worker process; current executable when unset
    pub worker_program: Option<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            provider: "glm".to_string(),
            workers: 4,
            resume: false,
            retry_failed: false,
            force: false,
            force_extract: false,
            max_pages: None,
            enhance_skill: true,
            config_file: None,
            worker_program: None,
        }
    }
}

/// How a stage ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Cached,
    Ran,
    Failed,
    Skipped,
}

/// One line of the structured run summary
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub status: StageStatus,
    pub duration_seconds: f64,
    pub detail: String,
}

/// Structured result of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub fingerprint: String,
    pub stages: Vec<StageReport>,
    /// Final Skill directory when assembly succeeded
    pub output_dir: Option<PathBuf>,
    /// True when the caller opted out of index enhancement
    pub basic_quality: bool,
    /// Error kind and message of the failing stage, when any
    pub error: Option<String>,
}

impl RunSummary {
    fn new(fingerprint: String) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            fingerprint,
            stages: Vec::new(),
            output_dir: None,
            basic_quality: false,
            error: None,
        }
    }

    /// True when every stage succeeded
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    fn record(&mut self, stage: &str, status: StageStatus, started: Instant, detail: String) {
        let report = StageReport {
            stage: stage.to_string(),
            status,
            duration_seconds: started.elapsed().as_secs_f64(),
            detail: detail.clone(),
        };
        match status {
            StageStatus::Failed => error!("[{}] failed: {}", stage, detail),
            _ => info!("[{}] {:?}: {}", stage, status, detail),
        }
        self.stages.push(report);
    }
}

/// The six-stage pipeline
#[derive(Debug)]
pub struct Pipeline {
    config: SkillsmithConfig,
    options: PipelineOptions,
    cache: CacheManager,
    provider: Arc<dyn Provider>,
    worker: Option<Arc<dyn ChunkWorker>>,
    cancel: Arc<AtomicBool>,
}

impl Pipeline {
    /// Wire a pipeline from configuration and per-run options
    pub fn new(config: SkillsmithConfig, options: PipelineOptions) -> Result<Self> {
        let registry = ProviderRegistry::new(config.provider_options.clone());
        let provider = registry.resolve(&options.provider)?;
        Ok(Self {
            cache: CacheManager::new(&config.cache_dir),
            config,
            options,
            provider,
            worker: None,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Wire a pipeline with an explicit provider and chunk worker
    ///
    /// The seam the test suites use to stub out LLM calls and process
    /// spawning.
    pub fn with_overrides(
        config: SkillsmithConfig,
        options: PipelineOptions,
        provider: Arc<dyn Provider>,
        worker: Arc<dyn ChunkWorker>,
    ) -> Self {
        Self {
            cache: CacheManager::new(&config.cache_dir),
            config,
            options,
            provider,
            worker: Some(worker),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops Stage 4 dispatch when set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run the pipeline over one PDF
    ///
    /// Always returns a summary; a failing stage sets `error` and stops
    /// downstream stages. The caller maps `succeeded()` to an exit
    /// code.
    pub async fn run(&self, pdf_path: &Path) -> Result<RunSummary> {
        let bytes = tokio::fs::read(pdf_path).await.map_err(|e| {
            SkillsmithError::extraction(
                pdf_path.display().to_string(),
                format!("failed to read file: {}", e),
            )
        })?;
        let fp = fingerprint(&bytes);
        let mut summary = RunSummary::new(fp.clone());
        info!(
            "Pipeline run {} over {} (fingerprint {})",
            summary.run_id,
            pdf_path.display(),
            fp
        );

        if self.options.force {
            self.cache.invalidate_fingerprint(&fp).await?;
        }

        // Stage 1: extraction
        let extraction = match self.stage_extract(&mut summary, pdf_path, &bytes, &fp).await {
            Some(extraction) => extraction,
            None => return Ok(summary),
        };

        // Stage 2: classification (degrades, never aborts)
        let classification = self.stage_classify(&mut summary, &extraction, &fp).await;

        // Stage 3: chunking
        let chunks = match self.stage_chunk(&mut summary, &extraction, &fp).await {
            Some(chunks) => chunks,
            None => return Ok(summary),
        };

        // Stage 4: enhancement
        let enhanced = match self.stage_enhance(&mut summary, &chunks, &fp).await {
            Some(enhanced) => enhanced,
            None => return Ok(summary),
        };

        // Stage 5: assembly
        let skill = match self
            .stage_assemble(&mut summary, &extraction, &classification, &enhanced)
            .await
        {
            Some(skill) => skill,
            None => return Ok(summary),
        };
        summary.output_dir = Some(skill.root.clone());

        // Stage 6: index enhancement (mandatory unless opted out)
        self.stage_enhance_skill(&mut summary, &skill).await;
        Ok(summary)
    }

    async fn stage_extract(
        &self,
        summary: &mut RunSummary,
        pdf_path: &Path,
        bytes: &[u8],
        fp: &str,
    ) -> Option<ExtractionRecord> {
        let started = Instant::now();
        let use_cache = !self.options.force && !self.options.force_extract;

        if use_cache {
            match self.cache.load::<ExtractionRecord>(STAGE_EXTRACTION, fp).await {
                Ok(Some(record)) if record.check_invariants().is_ok() => {
                    summary.record(
                        "extract",
                        StageStatus::Cached,
                        started,
                        format!("{} pages", record.total_pages),
                    );
                    return Some(record);
                }
                Ok(_) => {}
                Err(e) => warn!("Ignoring unusable extraction cache: {}", e),
            }
        }

        let extractor = match self.options.max_pages {
            Some(cap) => PdfExtractor::with_max_pages(cap),
            None => PdfExtractor::new(),
        };
        match extractor.extract_bytes(pdf_path, bytes) {
            Ok(record) => {
                let metadata = serde_json::json!({
                    "source_path": pdf_path,
                    "total_pages": record.total_pages,
                });
                if let Err(e) = self.cache.store(STAGE_EXTRACTION, fp, metadata, &record).await {
                    warn!("Could not cache extraction artifact: {}", e);
                }
                summary.record(
                    "extract",
                    StageStatus::Ran,
                    started,
                    format!("{} pages, {} chars", record.total_pages, record.full_text.len()),
                );
                Some(record)
            }
            Err(e) => {
                summary.error = Some(format!("{}: {}", e.kind(), e));
                summary.record("extract", StageStatus::Failed, started, e.to_string());
                None
            }
        }
    }

    async fn stage_classify(
        &self,
        summary: &mut RunSummary,
        extraction: &ExtractionRecord,
        fp: &str,
    ) -> ClassificationRecord {
        let started = Instant::now();

        if !self.options.force {
            if let Ok(Some(record)) = self
                .cache
                .load::<ClassificationRecord>(STAGE_CLASSIFICATION, fp)
                .await
            {
                summary.record(
                    "classify",
                    StageStatus::Cached,
                    started,
                    record.primary_category.to_string(),
                );
                return record;
            }
        }

        let classifier = Classifier::with_templates(self.config.prompts.clone());
        let provider = if self.provider.is_available().await {
            Some(self.provider.as_ref())
        } else {
            None
        };
        let record = classifier.classify(extraction, provider).await;
        if let Err(e) = self
            .cache
            .store(STAGE_CLASSIFICATION, fp, serde_json::Value::Null, &record)
            .await
        {
            // Classification never fails the pipeline, not even on a
            // cache write problem
            warn!("Could not cache classification artifact: {}", e);
        }
        summary.record(
            "classify",
            StageStatus::Ran,
            started,
            format!(
                "{} (confidence {:.2})",
                record.primary_category, record.confidence
            ),
        );
        record
    }

    async fn stage_chunk(
        &self,
        summary: &mut RunSummary,
        extraction: &ExtractionRecord,
        fp: &str,
    ) -> Option<Vec<Chunk>> {
        let started = Instant::now();

        if !self.options.force {
            if let Ok(Some(chunks)) = self.cache.load::<Vec<Chunk>>(STAGE_CHUNKS, fp).await {
                summary.record(
                    "chunk",
                    StageStatus::Cached,
                    started,
                    format!("{} chunks", chunks.len()),
                );
                return Some(chunks);
            }
        }

        let chunker = Chunker::with_config(self.config.chunking.clone());
        match chunker.chunk(extraction) {
            Ok(chunks) => {
                if let Err(e) = self
                    .cache
                    .store(STAGE_CHUNKS, fp, serde_json::Value::Null, &chunks)
                    .await
                {
                    summary.error = Some(format!("{}: {}", e.kind(), e));
                    summary.record("chunk", StageStatus::Failed, started, e.to_string());
                    return None;
                }
                summary.record(
                    "chunk",
                    StageStatus::Ran,
                    started,
                    format!("{} chunks", chunks.len()),
                );
                Some(chunks)
            }
            Err(e) => {
                summary.error = Some(format!("{}: {}", e.kind(), e));
                summary.record("chunk", StageStatus::Failed, started, e.to_string());
                None
            }
        }
    }

    async fn stage_enhance(
        &self,
        summary: &mut RunSummary,
        chunks: &[Chunk],
        fp: &str,
    ) -> Option<Vec<EnhancedChunk>> {
        let started = Instant::now();
        let output_dir = self.cache.enhanced_chunks_dir(fp);
        let min_chars = self.config.enhancement.min_enhanced_chars;

        // The engine auto-skips complete sets; peek first so the report
        // distinguishes a pure cache hit from a dispatching run.
        let prior = EnhancementProgress::rebuild_from_artifacts(
            &output_dir,
            chunks.len(),
            self.provider.name(),
            min_chars,
        )
        .await
        .ok();
        let already_complete = prior.map(|p| p.is_complete()).unwrap_or(false);

        let engine = EnhancementEngine::new(EnhancementEngineConfig {
            workers: self.options.workers,
            resume: self.options.resume,
            retry_failed: self.options.retry_failed,
            min_enhanced_chars: min_chars,
        });
        // Propagate top-level cancellation into the engine
        let engine_flag = engine.cancel_flag();
        let outer_flag = Arc::clone(&self.cancel);
        let watch = tokio::spawn(async move {
            loop {
                if outer_flag.load(std::sync::atomic::Ordering::SeqCst) {
                    engine_flag.store(true, std::sync::atomic::Ordering::SeqCst);
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        });

        let worker = self.worker.clone().unwrap_or_else(|| {
            Arc::new(SubprocessWorker {
                program: self
                    .options
                    .worker_program
                    .clone()
                    .unwrap_or_else(|| {
                        std::env::current_exe().unwrap_or_else(|_| PathBuf::from("skillsmith"))
                    }),
                cache_dir: self.cache.cache_dir().to_path_buf(),
                fingerprint: fp.to_string(),
                provider_name: self.options.provider.clone(),
                config_file: self.options.config_file.clone(),
            })
        });

        let result = engine
            .run(chunks, Arc::clone(&self.provider), worker, &output_dir)
            .await;
        watch.abort();

        let progress = match result {
            Ok(progress) => progress,
            Err(e) => {
                summary.error = Some(format!("{}: {}", e.kind(), e));
                summary.record("enhance", StageStatus::Failed, started, e.to_string());
                return None;
            }
        };

        if let Err(e) = ensure_enhancement_complete(&progress) {
            summary.error = Some(format!("{}: {}", e.kind(), e));
            summary.record("enhance", StageStatus::Failed, started, e.to_string());
            return None;
        }

        match self.load_enhanced_chunks(&output_dir, chunks.len()).await {
            Ok(enhanced) => {
                let status = if already_complete {
                    StageStatus::Cached
                } else {
                    StageStatus::Ran
                };
                summary.record(
                    "enhance",
                    status,
                    started,
                    format!(
                        "{}/{} chunks completed",
                        progress.completed_chunks.len(),
                        progress.total_chunks
                    ),
                );
                Some(enhanced)
            }
            Err(e) => {
                summary.error = Some(format!("{}: {}", e.kind(), e));
                summary.record("enhance", StageStatus::Failed, started, e.to_string());
                None
            }
        }
    }

    async fn load_enhanced_chunks(
        &self,
        output_dir: &Path,
        expected: usize,
    ) -> Result<Vec<EnhancedChunk>> {
        let mut enhanced = Vec::with_capacity(expected);
        for id in 1..=expected as u32 {
            let path = output_dir.join(crate::enhance::artifact_file_name(id));
            let raw = tokio::fs::read(&path).await.map_err(|e| {
                SkillsmithError::cache_mismatch(
                    path.display().to_string(),
                    format!("missing enhanced chunk artifact: {}", e),
                )
            })?;
            let chunk: EnhancedChunk = serde_json::from_slice(&raw).map_err(|e| {
                SkillsmithError::cache_mismatch(
                    path.display().to_string(),
                    format!("malformed enhanced chunk artifact: {}", e),
                )
            })?;
            enhanced.push(chunk);
        }
        Ok(enhanced)
    }

    async fn stage_assemble(
        &self,
        summary: &mut RunSummary,
        extraction: &ExtractionRecord,
        classification: &ClassificationRecord,
        enhanced: &[EnhancedChunk],
    ) -> Option<SkillDirectory> {
        let started = Instant::now();
        let assembler = SkillAssembler::new();
        let min_chars = self.config.enhancement.min_enhanced_chars;

        let located = assembler.locate(&self.config.output_dir, extraction, classification);
        if !self.options.force && assembler.is_assembled(&located, enhanced, min_chars) {
            summary.record(
                "assemble",
                StageStatus::Cached,
                started,
                located.root.display().to_string(),
            );
            return Some(located);
        }

        match assembler
            .assemble(
                &self.config.output_dir,
                extraction,
                classification,
                enhanced,
                min_chars,
            )
            .await
        {
            Ok(skill) => {
                summary.record(
                    "assemble",
                    StageStatus::Ran,
                    started,
                    skill.root.display().to_string(),
                );
                Some(skill)
            }
            Err(e) => {
                summary.error = Some(format!("{}: {}", e.kind(), e));
                summary.record("assemble", StageStatus::Failed, started, e.to_string());
                None
            }
        }
    }

    async fn stage_enhance_skill(&self, summary: &mut RunSummary, skill: &SkillDirectory) {
        let started = Instant::now();

        if !self.options.enhance_skill {
            summary.basic_quality = true;
            summary.record(
                "enhance-skill",
                StageStatus::Skipped,
                started,
                "opted out; output is basic quality".to_string(),
            );
            return;
        }

        // A previously enhanced index that still passes the gate counts
        // as a cache hit; the basic body never passes.
        if let Ok(current) = crate::fsutil::read_to_string(&skill.skill_md()).await {
            if !skill.skill_md_backup().exists() {
                let validator = SkillValidator::new(self.config.skill.clone());
                let report = validator.validate(&current);
                if report.valid {
                    summary.record(
                        "enhance-skill",
                        StageStatus::Cached,
                        started,
                        format!("quality score {}/10", report.score),
                    );
                    return;
                }
            }
        }

        let enhancer = SkillEnhancer::new(self.config.skill.clone(), self.config.prompts.clone());
        match enhancer.enhance(skill, Arc::clone(&self.provider)).await {
            Ok(report) => {
                summary.record(
                    "enhance-skill",
                    StageStatus::Ran,
                    started,
                    format!("quality score {}/10", report.score),
                );
            }
            Err(e) => {
                // High-quality index or none at all: drop the basic one
                if let Err(remove_err) = tokio::fs::remove_file(skill.skill_md()).await {
                    warn!("Could not remove low-quality index: {}", remove_err);
                }
                summary.error = Some(format!("{}: {}", e.kind(), e));
                summary.record("enhance-skill", StageStatus::Failed, started, e.to_string());
            }
        }
    }
}
