//! `skillsmith cache` - inspect and invalidate cached artifacts

use crate::output::{OutputFormat, OutputFormatter};
use crate::CliCommand;
use clap::{Args, Subcommand};
use skillsmith_core::{CacheManager, Result, SkillsmithConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Arguments for the cache command
#[derive(Debug, Clone, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,

    /// Cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,
}

/// Cache maintenance operations
#[derive(Debug, Clone, Subcommand)]
pub enum CacheCommand {
    /// Show cache statistics
    Status,
    /// Remove cached artifacts
    Clear {
        /// Remove only artifacts for this fingerprint
        #[arg(long)]
        fingerprint: Option<String>,
        /// Remove only artifacts older than this many days
        #[arg(long)]
        older_than_days: Option<u64>,
    },
}

impl CacheArgs {
    fn cache(&self) -> Result<CacheManager> {
        let config = SkillsmithConfig::load(self.config.as_deref())?;
        let dir = self.cache_dir.clone().unwrap_or(config.cache_dir);
        Ok(CacheManager::new(dir))
    }
}

impl CliCommand for CacheArgs {
    async fn execute(&self) -> Result<i32> {
        let cache = self.cache()?;
        let mut formatter = OutputFormatter::new(self.format);

        match &self.command {
            CacheCommand::Status => {
                let stats = cache.stats();
                match self.format {
                    OutputFormat::Json => formatter.json(&stats)?,
                    OutputFormat::Pretty => {
                        println!(
                            "  {} files, {} enhanced-chunk dirs, {:.1} MiB",
                            stats.total_files,
                            stats.enhanced_chunk_dirs,
                            stats.total_size_bytes as f64 / (1024.0 * 1024.0)
                        );
                    }
                }
            }
            CacheCommand::Clear {
                fingerprint,
                older_than_days,
            } => {
                let removed = match (fingerprint, older_than_days) {
                    (Some(fp), _) => cache.invalidate_fingerprint(fp).await?,
                    (None, Some(days)) => {
                        cache
                            .invalidate_older_than(Duration::from_secs(days * 24 * 3600))
                            .await?
                    }
                    (None, None) => cache.invalidate_older_than(Duration::ZERO).await?,
                };
                println!("  removed {} cache entr{}", removed, if removed == 1 { "y" } else { "ies" });
            }
        }
        Ok(0)
    }

    fn name(&self) -> &'static str {
        "cache"
    }
}
