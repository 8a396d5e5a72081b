//! `skillsmith ingest` - run the full pipeline over one PDF

use crate::output::{OutputFormat, OutputFormatter};
use crate::CliCommand;
use clap::Args;
use skillsmith_core::pipeline::{Pipeline, PipelineOptions};
use skillsmith_core::{Result, SkillsmithConfig};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

/// Arguments for the ingest command
#[derive(Debug, Clone, Args)]
pub struct IngestArgs {
    /// PDF file to ingest
    pub pdf: PathBuf,

    /// Provider backend to use
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Worker process count for enhancement (1-8)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Resume a previously interrupted enhancement run
    #[arg(long)]
    pub resume: bool,

    /// Re-dispatch previously failed chunks
    #[arg(long)]
    pub retry_failed: bool,

    /// Ignore all cached artifacts and re-run every stage
    #[arg(long)]
    pub force: bool,

    /// Re-run extraction even when cached
    #[arg(long)]
    pub force_extract: bool,

    /// Stop extraction after this many pages
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Output directory for Skill packages
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Skip the mandatory index enhancement; output is marked basic
    #[arg(long)]
    pub no_enhance_skill: bool,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,
}

impl IngestArgs {
    fn build(&self) -> Result<(SkillsmithConfig, PipelineOptions)> {
        let mut config = SkillsmithConfig::load(self.config.as_deref())?;
        if let Some(dir) = &self.output {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers.clamp(1, 8);
        }

        let options = PipelineOptions {
            provider: self
                .provider
                .clone()
                .unwrap_or_else(|| config.provider.clone()),
            workers: config.workers,
            resume: self.resume,
            retry_failed: self.retry_failed,
            force: self.force,
            force_extract: self.force_extract,
            max_pages: self.max_pages,
            enhance_skill: !self.no_enhance_skill,
            config_file: self.config.clone(),
            worker_program: None,
        };
        Ok((config, options))
    }
}

impl CliCommand for IngestArgs {
    async fn execute(&self) -> Result<i32> {
        let (config, options) = self.build()?;
        let pipeline = Pipeline::new(config, options)?;

        // Stop dispatching new chunks on Ctrl-C; in-flight workers drain
        let cancel = pipeline.cancel_flag();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; finishing in-flight chunks");
                cancel.store(true, Ordering::SeqCst);
            }
        });

        let summary = pipeline.run(&self.pdf).await?;
        OutputFormatter::new(self.format).summary(&summary)?;

        if summary.succeeded() {
            info!("Pipeline completed");
            Ok(0)
        } else {
            Ok(1)
        }
    }

    fn name(&self) -> &'static str {
        "ingest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pdf: &str) -> IngestArgs {
        IngestArgs {
            pdf: PathBuf::from(pdf),
            provider: Some("anthropic".to_string()),
            workers: Some(12),
            resume: false,
            retry_failed: false,
            force: false,
            force_extract: false,
            max_pages: None,
            output: Some(PathBuf::from("/tmp/out")),
            cache_dir: None,
            no_enhance_skill: true,
            config: None,
            format: OutputFormat::Pretty,
        }
    }

    #[test]
    fn test_flag_mapping() {
        let (config, options) = args("guide.pdf").build().unwrap();
        assert_eq!(options.provider, "anthropic");
        // Worker counts clamp into [1, 8]
        assert_eq!(options.workers, 8);
        assert!(!options.enhance_skill);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_provider_falls_back_to_config_default() {
        let mut ingest = args("guide.pdf");
        ingest.provider = None;
        let (config, options) = ingest.build().unwrap();
        assert_eq!(options.provider, config.provider);
    }
}
