//! Quality gate for the enhanced index document
//!
//! The operating principle is "a high-quality index or no index at
//! all". Minimum length is a hard requirement; missing sections, too
//! few code blocks, and absent domain tokens accumulate warnings. More
//! than two warnings tips the document into invalid. The score is
//! advisory output; validity is the gating boolean.

use crate::config::SkillConfig;
use serde::Serialize;
use tracing::debug;

/// Sections the enhanced index must contain
pub const REQUIRED_SECTIONS: &[&str] = &["When to Use", "Quick Reference", "Reference Documentation"];

/// Minimum fenced code blocks in a valid index
const MIN_CODE_BLOCKS: usize = 2;

/// Warnings tolerated before the document is declared invalid
const MAX_WARNINGS: usize = 2;

/// Validation outcome for one index document
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// The gating boolean
    pub valid: bool,
    /// 10 minus one per warning, floor 0; advisory only
    pub score: u8,
    /// Soft findings, each costing one point
    pub warnings: Vec<String>,
    /// Findings that invalidate the document outright
    pub hard_failures: Vec<String>,
}

/// Stage 6 validator
#[derive(Debug, Clone)]
pub struct SkillValidator {
    config: SkillConfig,
}

impl SkillValidator {
    /// Create a validator with the given skill configuration
    pub fn new(config: SkillConfig) -> Self {
        Self { config }
    }

    /// Validate an enhanced index document
    pub fn validate(&self, markdown: &str) -> ValidationReport {
        let mut warnings = Vec::new();
        let mut hard_failures = Vec::new();

        let trimmed = markdown.trim();
        if trimmed.len() < self.config.min_index_chars {
            hard_failures.push(format!(
                "document of {} chars is below the {}-char minimum",
                trimmed.len(),
                self.config.min_index_chars
            ));
        }

        for section in REQUIRED_SECTIONS {
            if !contains_heading(trimmed, section) {
                warnings.push(format!("missing required section '{}'", section));
            }
        }

        let code_blocks = count_code_blocks(trimmed);
        if code_blocks < MIN_CODE_BLOCKS {
            warnings.push(format!(
                "{} fenced code block(s), expected at least {}",
                code_blocks, MIN_CODE_BLOCKS
            ));
        }

        let has_domain_token = self
            .config
            .domain_tokens
            .iter()
            .any(|token| trimmed.contains(token.as_str()));
        if !has_domain_token {
            warnings.push(format!(
                "no domain token present (expected one of {})",
                self.config.domain_tokens.join(", ")
            ));
        }

        let valid = hard_failures.is_empty() && warnings.len() <= MAX_WARNINGS;
        let score = 10u8.saturating_sub(warnings.len() as u8);
        debug!(
            "Index validation: valid={}, score={}, {} warning(s)",
            valid,
            score,
            warnings.len()
        );

        ValidationReport {
            valid,
            score,
            warnings,
            hard_failures,
        }
    }
}

/// Check for a Markdown heading containing the section name
fn contains_heading(markdown: &str, section: &str) -> bool {
    markdown
        .lines()
        .any(|line| line.trim_start().starts_with('#') && line.contains(section))
}

/// Count fenced code blocks (pairs of ``` fences)
fn count_code_blocks(markdown: &str) -> usize {
    let fences = markdown
        .lines()
        .filter(|line| line.trim_start().starts_with("```"))
        .count();
    fences / 2
}
