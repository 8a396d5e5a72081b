//! `skillsmith enhance-worker` - hidden Stage 4 worker entry point
//!
//! The enhancement engine spawns one of these processes per chunk.
//! A worker that managed to write its artifact exits 0 even when the
//! chunk failed: the artifact is the outcome, and the engine reads it
//! from disk. A non-zero exit with no artifact means the worker
//! crashed.

use crate::CliCommand;
use clap::Args;
use skillsmith_core::enhance::worker::{artifact_file_name, run_worker_entry};
use skillsmith_core::{Result, SkillsmithConfig};
use std::path::PathBuf;
use tracing::error;

/// Arguments for the worker subcommand
#[derive(Debug, Clone, Args)]
pub struct WorkerArgs {
    /// Cache directory holding the chunks artifact
    #[arg(long)]
    pub cache_dir: PathBuf,

    /// Fingerprint of the PDF being processed
    #[arg(long)]
    pub fingerprint: String,

    /// Chunk id to enhance
    #[arg(long)]
    pub chunk_id: u32,

    /// Provider backend to use
    #[arg(long)]
    pub provider: String,

    /// Directory for the per-chunk artifact
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl CliCommand for WorkerArgs {
    async fn execute(&self) -> Result<i32> {
        let config = SkillsmithConfig::load(self.config.as_deref())?;
        let outcome = run_worker_entry(
            &self.cache_dir,
            &self.fingerprint,
            self.chunk_id,
            &self.provider,
            &self.output_dir,
            &config,
        )
        .await;

        match outcome {
            Ok(()) => Ok(0),
            Err(e) => {
                error!("Worker for chunk {} failed: {}", self.chunk_id, e);
                // The failure artifact is the real signal; crash only
                // when even that could not be written
                let artifact = self.output_dir.join(artifact_file_name(self.chunk_id));
                if artifact.exists() {
                    Ok(0)
                } else {
                    Err(e)
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "enhance-worker"
    }
}
