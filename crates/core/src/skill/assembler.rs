//! Stage 5: Skill directory assembly
//!
//! Lays out the final knowledge package:
//!
//! ```text
//! <output>/<category>-<pdf-stem>/
//!   SKILL.md              # basic index; Stage 6 rewrites it
//!   references/
//!     index.md
//!     chunk-NNN-<slug>.md
//!   raw/
//!     full-extract.txt
//! ```
//!
//! The set of reference files equals the set of validly enhanced
//! chunks; raw text is always present. The basic `SKILL.md` body is
//! intentionally minimal: it exists so Stage 6 has something to
//! enhance.

use crate::error::{Result, SkillsmithError};
use crate::fsutil;
use crate::types::{slugify, ClassificationRecord, EnhancedChunk, ExtractionRecord};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// The assembled package location
#[derive(Debug, Clone)]
pub struct SkillDirectory {
    /// Directory name, `<category>-<pdf-stem>` slugified
    pub name: String,
    /// Absolute package root
    pub root: PathBuf,
}

impl SkillDirectory {
    /// Path of the index document
    pub fn skill_md(&self) -> PathBuf {
        self.root.join("SKILL.md")
    }

    /// Path of the index backup used by Stage 6
    pub fn skill_md_backup(&self) -> PathBuf {
        self.root.join("SKILL.md.backup")
    }

    /// Path of the references directory
    pub fn references_dir(&self) -> PathBuf {
        self.root.join("references")
    }

    /// Path of the raw extract directory
    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }
}

/// YAML front-matter of `SKILL.md`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillFrontMatter {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub domain: String,
    pub priority: String,
    pub version: String,
    pub source: String,
}

/// Stage 5 assembler
#[derive(Debug, Clone, Default)]
pub struct SkillAssembler;

impl SkillAssembler {
    /// Create an assembler
    pub fn new() -> Self {
        Self
    }

    /// Compute the package location without writing anything
    pub fn locate(
        &self,
        output_root: &Path,
        extraction: &ExtractionRecord,
        classification: &ClassificationRecord,
    ) -> SkillDirectory {
        let stem = pdf_stem(&extraction.source_path);
        let name = slugify(&format!(
            "{}-{}",
            classification.primary_category.as_str(),
            stem
        ));
        SkillDirectory {
            root: output_root.join(&name),
            name,
        }
    }

    /// Check whether a complete package already exists on disk
    ///
    /// True when the index, the raw extract, and one reference file per
    /// validly enhanced chunk are all present and no Stage 6 backup is
    /// in flight. The orchestrator treats that as a Stage 5 cache hit
    /// so a warm run never clobbers an already enhanced index.
    pub fn is_assembled(
        &self,
        skill: &SkillDirectory,
        enhanced: &[EnhancedChunk],
        min_enhanced_chars: usize,
    ) -> bool {
        if !skill.skill_md().exists()
            || skill.skill_md_backup().exists()
            || !skill.raw_dir().join("full-extract.txt").exists()
            || !skill.references_dir().join("index.md").exists()
        {
            return false;
        }
        enhanced
            .iter()
            .filter(|c| c.is_valid(min_enhanced_chars))
            .all(|c| skill.references_dir().join(reference_file_name(c)).exists())
    }

    /// Assemble the Skill directory under `output_root`
    ///
    /// Only validly enhanced chunks become reference files; the caller
    /// guarantees the set is complete (Stage 4 gates on it).
    pub async fn assemble(
        &self,
        output_root: &Path,
        extraction: &ExtractionRecord,
        classification: &ClassificationRecord,
        enhanced: &[EnhancedChunk],
        min_enhanced_chars: usize,
    ) -> Result<SkillDirectory> {
        let stem = pdf_stem(&extraction.source_path);
        let skill = self.locate(output_root, extraction, classification);

        let mut valid: Vec<&EnhancedChunk> = enhanced
            .iter()
            .filter(|c| c.is_valid(min_enhanced_chars))
            .collect();
        valid.sort_by_key(|c| c.chunk_id);
        if valid.is_empty() {
            return Err(SkillsmithError::pipeline(
                "no validly enhanced chunks to assemble",
            ));
        }

        fsutil::ensure_dir(&skill.references_dir()).await?;
        fsutil::ensure_dir(&skill.raw_dir()).await?;

        fsutil::write_atomic_string(
            skill.raw_dir().join("full-extract.txt"),
            &extraction.full_text,
        )
        .await?;

        for chunk in &valid {
            let path = skill.references_dir().join(reference_file_name(chunk));
            fsutil::write_atomic_string(&path, &chunk.enhanced_content).await?;
        }

        fsutil::write_atomic_string(
            skill.references_dir().join("index.md"),
            &render_reference_index(&skill.name, &valid),
        )
        .await?;

        let front_matter = self.build_front_matter(&skill.name, &stem, extraction, classification);
        fsutil::write_atomic_string(
            skill.skill_md(),
            &render_basic_skill_md(&front_matter, &valid)?,
        )
        .await?;

        info!(
            "Assembled Skill directory {} with {} references",
            skill.root.display(),
            valid.len()
        );
        Ok(skill)
    }

    fn build_front_matter(
        &self,
        name: &str,
        stem: &str,
        extraction: &ExtractionRecord,
        classification: &ClassificationRecord,
    ) -> SkillFrontMatter {
        let mut tags: Vec<String> = classification
            .keywords
            .iter()
            .take(5)
            .map(|k| slugify(k))
            .collect();
        tags.dedup();

        SkillFrontMatter {
            id: name.to_string(),
            title: format!(
                "{} - {}",
                humanize(classification.primary_category.as_str()),
                humanize(stem)
            ),
            description: format!(
                "Curated reference material on {} extracted from {} ({} pages)",
                classification.primary_category,
                stem,
                extraction.total_pages
            ),
            tags,
            domain: classification.primary_category.to_string(),
            priority: if classification.confidence >= 0.7 {
                "high".to_string()
            } else {
                "normal".to_string()
            },
            version: "1.0".to_string(),
            source: extraction
                .source_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| stem.to_string()),
        }
    }
}

/// Reference file name for an enhanced chunk
pub fn reference_file_name(chunk: &EnhancedChunk) -> String {
    format!("chunk-{:03}-{}.md", chunk.chunk_id, chunk.slug)
}

/// PDF file stem without extension
fn pdf_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

fn humanize(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_reference_index(name: &str, chunks: &[&EnhancedChunk]) -> String {
    let mut index = String::new();
    index.push_str(&format!("# {} - Reference Index\n\n", humanize(name)));
    index.push_str("| Chapter | Title | File |\n|---|---|---|\n");
    for chunk in chunks {
        let file = reference_file_name(chunk);
        index.push_str(&format!(
            "| {} | {} | [{}]({}) |\n",
            chunk.chunk_id, chunk.title, file, file
        ));
    }
    index
}

fn render_basic_skill_md(
    front_matter: &SkillFrontMatter,
    chunks: &[&EnhancedChunk],
) -> Result<String> {
    let yaml = serde_yaml::to_string(front_matter)?;
    let mut body = String::new();
    body.push_str(&format!("# {}\n\n", front_matter.title));
    body.push_str(&format!("{}\n\n", front_matter.description));
    body.push_str("## Contents\n\n");
    for chunk in chunks {
        body.push_str(&format!(
            "- [{}](references/{})\n",
            chunk.title,
            reference_file_name(chunk)
        ));
    }
    body.push_str("\nSee `references/index.md` for the full chapter index.\n");
    Ok(format!("---\n{}---\n\n{}", yaml, body))
}
