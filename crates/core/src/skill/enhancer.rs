//! Stage 6: index enhancement
//!
//! Rewrites the basic `SKILL.md` into a high-quality index document via
//! the configured provider, guarded by the validator. The current index
//! is backed up first; any failure restores it, and the backup file
//! stays behind as the marker of an unfinished or failed enhancement.

use crate::config::SkillConfig;
use crate::error::{Result, SkillsmithError};
use crate::fsutil;
use crate::prompts::PromptTemplates;
use crate::providers::Provider;
use crate::skill::assembler::SkillDirectory;
use crate::skill::validator::{SkillValidator, ValidationReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

/// Timeout floor for the single large enhancement call
const TIMEOUT_FLOOR: Duration = Duration::from_secs(240);

/// Stage 6 enhancer
#[derive(Debug, Clone)]
pub struct SkillEnhancer {
    config: SkillConfig,
    templates: PromptTemplates,
    validator: SkillValidator,
}

impl SkillEnhancer {
    /// Create an enhancer with the given configuration and templates
    pub fn new(config: SkillConfig, templates: PromptTemplates) -> Self {
        let validator = SkillValidator::new(config.clone());
        Self {
            config,
            templates,
            validator,
        }
    }

    /// Replace `SKILL.md` with an enhanced version that passes the gate
    ///
    /// On success the backup is deleted and the validation report (with
    /// its advisory score) is returned. On any failure `SKILL.md` is
    /// restored from the backup, the backup stays on disk, and an error
    /// propagates; the orchestrator decides what to do with the
    /// low-quality index.
    pub async fn enhance(
        &self,
        skill: &SkillDirectory,
        provider: Arc<dyn Provider>,
    ) -> Result<ValidationReport> {
        let skill_md = skill.skill_md();
        let backup = skill.skill_md_backup();

        let current = fsutil::read_to_string(&skill_md).await?;
        fsutil::write_atomic_string(&backup, &current).await?;

        let references = self.read_reference_excerpts(skill).await?;
        let prompt = self
            .templates
            .skill_index_prompt(&skill.name, &current, &references);

        let timeout = provider.timeout_for(prompt.len()).max(TIMEOUT_FLOOR);
        info!(
            "Enhancing index for {} via {} ({} prompt chars, {}s timeout)",
            skill.name,
            provider.name(),
            prompt.len(),
            timeout.as_secs()
        );

        let response = match provider.invoke_with_timeout(&prompt, timeout).await {
            Ok(response) => strip_outer_fence(&response).to_string(),
            Err(e) => {
                warn!("Index enhancement failed: {}", e);
                self.restore(&skill_md, &backup).await?;
                return Err(e.into_pipeline_error(provider.name()));
            }
        };

        let report = self.validator.validate(&response);
        if !report.valid {
            let findings: Vec<&str> = report
                .hard_failures
                .iter()
                .chain(report.warnings.iter())
                .map(String::as_str)
                .collect();
            warn!("Enhanced index rejected: {}", findings.join("; "));
            self.restore(&skill_md, &backup).await?;
            return Err(SkillsmithError::validation(format!(
                "enhanced index rejected: {}",
                findings.join("; ")
            )));
        }

        fsutil::write_atomic_string(&skill_md, &response).await?;
        fs::remove_file(&backup).await?;
        info!(
            "Index for {} enhanced (quality score {}/10)",
            skill.name, report.score
        );
        Ok(report)
    }

    /// Collect capped reference excerpts, oldest chapter first
    async fn read_reference_excerpts(&self, skill: &SkillDirectory) -> Result<String> {
        let mut names: Vec<String> = Vec::new();
        let mut entries = fs::read_dir(skill.references_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("chunk-") && name.ends_with(".md") {
                names.push(name);
            }
        }
        // Zero-padded chunk numbers make lexical order chapter order
        names.sort();
        names.truncate(self.config.max_reference_files);

        let mut excerpts = String::new();
        for name in names {
            if excerpts.len() >= self.config.max_total_reference_chars {
                break;
            }
            let content = fsutil::read_to_string(skill.references_dir().join(&name)).await?;
            let budget = (self.config.max_total_reference_chars - excerpts.len())
                .min(self.config.max_chars_per_reference);
            let excerpt = truncate_chars(&content, budget);
            excerpts.push_str(&format!("\n--- {} ---\n{}\n", name, excerpt));
        }
        Ok(excerpts)
    }

    async fn restore(&self, skill_md: &std::path::Path, backup: &std::path::Path) -> Result<()> {
        let content = fsutil::read_to_string(backup).await?;
        fsutil::write_atomic_string(skill_md, &content).await?;
        Ok(())
    }
}

/// Cut a string to at most `max` bytes on a char boundary
fn truncate_chars(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Remove a single outer code fence wrapping the whole document
///
/// Some backends wrap their Markdown answer in ```markdown fences even
/// when told not to.
fn strip_outer_fence(response: &str) -> &str {
    let trimmed = response.trim();
    if !trimmed.starts_with("```") || !trimmed.ends_with("```") {
        return trimmed;
    }
    let Some(first_newline) = trimmed.find('\n') else {
        return trimmed;
    };
    let inner = &trimmed[first_newline + 1..trimmed.len() - 3];
    // Only unwrap when the fences balance; an interior fence pair means
    // the outer markers belong to the document itself
    let inner_trimmed = inner.trim();
    if inner_trimmed.contains("\n```\n") || inner_trimmed.starts_with("```") {
        trimmed
    } else {
        inner_trimmed
    }
}
