//! Skillsmith core library
//!
//! Turns a tax-guide PDF into a curated "Skill" knowledge package
//! through a six-stage pipeline: extract, classify, chunk, enhance,
//! assemble, enhance-index. Every stage is gated by a content-addressed
//! cache, Stage 4 fans out over shared-nothing worker processes, and
//! LLM backends sit behind a single provider trait.

pub mod cache;
pub mod chunker;
pub mod classify;
pub mod config;
pub mod enhance;
pub mod error;
pub mod extract;
pub mod fsutil;
pub mod hash;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod skill;
pub mod types;

// Re-export commonly used types
pub use cache::{ArtifactEnvelope, CacheManager, CacheStats};
pub use chunker::Chunker;
pub use classify::Classifier;
pub use config::{ProviderOptions, SkillsmithConfig};
pub use enhance::{
    ChunkWorker, EnhancementEngine, EnhancementEngineConfig, EnhancementProgress, SubprocessWorker,
    WorkerContext,
};
pub use error::{Result, SkillsmithError};
pub use extract::PdfExtractor;
pub use hash::fingerprint;
pub use pipeline::{Pipeline, PipelineOptions, RunSummary, StageReport, StageStatus};
pub use prompts::PromptTemplates;
pub use providers::{Provider, ProviderError, ProviderRegistry};
pub use skill::{SkillAssembler, SkillDirectory, SkillEnhancer, SkillValidator, ValidationReport};
pub use types::{
    Category, Chunk, ChunkStatus, ClassificationRecord, EnhancedChunk, ExtractionRecord,
    QualityMetrics,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get version info as a formatted string
pub fn version_info() -> String {
    format!("{} v{}", NAME, VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _: Result<()> = Ok(());
        let fp = fingerprint(b"bytes");
        assert_eq!(fp.len(), 16);
    }

    #[test]
    fn test_version_info() {
        let info = version_info();
        assert!(info.contains("skillsmith-core"));
        assert!(info.contains('v'));
    }
}
