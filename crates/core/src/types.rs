//! Shared data model for the Skillsmith pipeline
//!
//! Each record here is produced by exactly one stage and owned by the
//! cache manager afterwards. Stages read upstream records and never
//! mutate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Text extracted from a single PDF page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number
    pub page_number: usize,
    /// Raw extracted text
    pub text: String,
    /// Character count of `text`
    pub char_count: usize,
    /// Line count of `text`
    pub line_count: usize,
}

impl PageText {
    /// Build a page record from its number and text
    pub fn new(page_number: usize, text: String) -> Self {
        let char_count = text.len();
        let line_count = text.lines().count();
        Self {
            page_number,
            text,
            char_count,
            line_count,
        }
    }
}

/// Stage 1 output: page-keyed text for one PDF
///
/// Invariant: page numbers are contiguous from 1 to `total_pages`, and
/// `full_text` equals the ordered page texts joined with `\n`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// Path the PDF was read from
    pub source_path: PathBuf,
    /// Content fingerprint of the PDF bytes
    pub fingerprint: String,
    /// Total number of extracted pages
    pub total_pages: usize,
    /// Ordered concatenation of all page texts
    pub full_text: String,
    /// Per-page records, ordered by page number
    pub pages: Vec<PageText>,
}

impl ExtractionRecord {
    /// Verify the assembly invariants: contiguous pages and matching full text
    pub fn check_invariants(&self) -> crate::Result<()> {
        if self.pages.len() != self.total_pages {
            return Err(crate::SkillsmithError::cache_mismatch(
                format!("extraction_{}", self.fingerprint),
                format!(
                    "page count {} does not match total_pages {}",
                    self.pages.len(),
                    self.total_pages
                ),
            ));
        }
        for (i, page) in self.pages.iter().enumerate() {
            if page.page_number != i + 1 {
                return Err(crate::SkillsmithError::cache_mismatch(
                    format!("extraction_{}", self.fingerprint),
                    format!("page {} found at position {}", page.page_number, i + 1),
                ));
            }
        }
        let joined = self
            .pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if joined != self.full_text {
            return Err(crate::SkillsmithError::cache_mismatch(
                format!("extraction_{}", self.fingerprint),
                "full_text does not equal joined page texts",
            ));
        }
        Ok(())
    }
}

/// Closed category set for tax-guide content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    EmploymentIncome,
    SelfEmployment,
    Deductions,
    Credits,
    Investments,
    Retirement,
    Benefits,
    SmallBusiness,
    General,
}

impl Category {
    /// All categories, used by the keyword fallback scorer
    pub fn all() -> &'static [Category] {
        &[
            Category::EmploymentIncome,
            Category::SelfEmployment,
            Category::Deductions,
            Category::Credits,
            Category::Investments,
            Category::Retirement,
            Category::Benefits,
            Category::SmallBusiness,
            Category::General,
        ]
    }

    /// Stable kebab-case name, also used in Skill directory names
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::EmploymentIncome => "employment-income",
            Category::SelfEmployment => "self-employment",
            Category::Deductions => "deductions",
            Category::Credits => "credits",
            Category::Investments => "investments",
            Category::Retirement => "retirement",
            Category::Benefits => "benefits",
            Category::SmallBusiness => "small-business",
            Category::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A category with its score, used for secondary matches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCategory {
    pub category: Category,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

/// Five fixed quality sub-scores, each in [0, 1]
///
/// Downstream consumers rely on these exact field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub completeness: f64,
    pub accuracy: f64,
    pub relevance: f64,
    pub clarity: f64,
    pub practicality: f64,
}

impl QualityMetrics {
    /// Clamp every sub-score into [0, 1]
    pub fn clamped(self) -> Self {
        Self {
            completeness: self.completeness.clamp(0.0, 1.0),
            accuracy: self.accuracy.clamp(0.0, 1.0),
            relevance: self.relevance.clamp(0.0, 1.0),
            clarity: self.clarity.clamp(0.0, 1.0),
            practicality: self.practicality.clamp(0.0, 1.0),
        }
    }

    /// Mean of the five sub-scores
    pub fn overall(&self) -> f64 {
        (self.completeness + self.accuracy + self.relevance + self.clarity + self.practicality)
            / 5.0
    }
}

/// Stage 2 output: category and quality assessment for the document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRecord {
    /// Highest-scoring category; never empty
    pub primary_category: Category,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Possibly-empty ordered list of runner-up categories
    pub secondary_categories: Vec<ScoredCategory>,
    /// Five fixed quality sub-scores
    pub quality: QualityMetrics,
    /// Matched keywords; non-empty by contract
    pub keywords: Vec<String>,
}

impl ClassificationRecord {
    /// Clamp confidences and sub-scores into range
    pub fn normalized(mut self) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        for secondary in &mut self.secondary_categories {
            secondary.confidence = secondary.confidence.clamp(0.0, 1.0);
        }
        self.quality = self.quality.clamped();
        self
    }
}

/// Stage 3 output item: one contiguous piece of the document
///
/// Chunks are the unit of parallelism and of caching in Stage 4.
/// Invariants: ids are dense from 1 to N, slugs are unique within a set,
/// and `char_count` equals `text.len()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// 1-based chunk id, dense across the set
    pub id: u32,
    /// Detected chapter number; equals `id` when no chapter was detected
    pub chapter_number: u32,
    /// Human-readable title
    pub title: String,
    /// URL-safe slug derived from the title, unique within the set
    pub slug: String,
    /// Full chunk text
    pub text: String,
    /// Character count of `text`
    pub char_count: usize,
}

/// Outcome of enhancing one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Completed,
    Failed,
}

/// Stage 4 output item: one AI-enhanced chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedChunk {
    /// Matches the input chunk id
    pub chunk_id: u32,
    /// Original chunk title
    pub title: String,
    /// Original chunk slug
    pub slug: String,
    /// Enhanced Markdown content; empty on failure
    pub enhanced_content: String,
    /// When enhancement finished
    pub enhanced_at: DateTime<Utc>,
    /// Provider identifier that produced the content
    pub provider: String,
    /// Completed or failed
    pub status: ChunkStatus,
    /// Approximate token count of the output
    pub token_count: usize,
    /// Error message when status is failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnhancedChunk {
    /// A chunk is valid when completed with enough trimmed content
    pub fn is_valid(&self, min_chars: usize) -> bool {
        self.status == ChunkStatus::Completed && self.enhanced_content.trim().len() >= min_chars
    }
}

/// Derive a URL-safe slug from a title
///
/// Lowercases, maps runs of non-alphanumeric characters to single
/// hyphens, and trims leading/trailing hyphens. Falls back to "section"
/// when nothing survives.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_hyphen = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}

/// Approximate token count from text length
///
/// Four characters per token is close enough for progress records and
/// logs; nothing downstream bills by this number.
pub fn approximate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_pages(texts: &[&str]) -> ExtractionRecord {
        let pages: Vec<PageText> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| PageText::new(i + 1, t.to_string()))
            .collect();
        ExtractionRecord {
            source_path: PathBuf::from("guide.pdf"),
            fingerprint: "0123456789abcdef".to_string(),
            total_pages: pages.len(),
            full_text: texts.join("\n"),
            pages,
        }
    }

    #[test]
    fn test_page_text_counts() {
        let page = PageText::new(1, "line one\nline two".to_string());
        assert_eq!(page.char_count, 17);
        assert_eq!(page.line_count, 2);
    }

    #[test]
    fn test_extraction_invariants_hold() {
        let record = record_with_pages(&["first page", "second page"]);
        assert!(record.check_invariants().is_ok());
    }

    #[test]
    fn test_extraction_invariants_detect_gap() {
        let mut record = record_with_pages(&["first", "second"]);
        record.pages[1].page_number = 3;
        let err = record.check_invariants().unwrap_err();
        assert_eq!(err.kind(), "cache-mismatch");
    }

    #[test]
    fn test_extraction_invariants_detect_text_drift() {
        let mut record = record_with_pages(&["first", "second"]);
        record.full_text = "something else".to_string();
        assert!(record.check_invariants().is_err());
    }

    #[test]
    fn test_category_round_trip() {
        for category in Category::all() {
            let json = serde_json::to_string(category).unwrap();
            let back: Category = serde_json::from_str(&json).unwrap();
            assert_eq!(*category, back);
        }
        assert_eq!(Category::EmploymentIncome.as_str(), "employment-income");
    }

    #[test]
    fn test_classification_normalization_clamps() {
        let record = ClassificationRecord {
            primary_category: Category::Credits,
            confidence: 1.7,
            secondary_categories: vec![ScoredCategory {
                category: Category::Deductions,
                confidence: -0.2,
            }],
            quality: QualityMetrics {
                completeness: 1.4,
                accuracy: 0.9,
                relevance: 0.8,
                clarity: -0.1,
                practicality: 0.5,
            },
            keywords: vec!["credit".to_string()],
        }
        .normalized();

        assert_eq!(record.confidence, 1.0);
        assert_eq!(record.secondary_categories[0].confidence, 0.0);
        assert_eq!(record.quality.completeness, 1.0);
        assert_eq!(record.quality.clarity, 0.0);
    }

    #[test]
    fn test_quality_overall() {
        let quality = QualityMetrics {
            completeness: 1.0,
            accuracy: 0.5,
            relevance: 0.5,
            clarity: 0.5,
            practicality: 0.0,
        };
        assert!((quality.overall() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_enhanced_chunk_validity() {
        let chunk = EnhancedChunk {
            chunk_id: 1,
            title: "Chapter 1".to_string(),
            slug: "chapter-1".to_string(),
            enhanced_content: "x".repeat(60),
            enhanced_at: Utc::now(),
            provider: "stub".to_string(),
            status: ChunkStatus::Completed,
            token_count: 15,
            error: None,
        };
        assert!(chunk.is_valid(50));
        assert!(!chunk.is_valid(100));

        let failed = EnhancedChunk {
            status: ChunkStatus::Failed,
            ..chunk
        };
        assert!(!failed.is_valid(50));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Chapter 3: RRSP Contributions"), "chapter-3-rrsp-contributions");
        assert_eq!(slugify("  Weird -- Title!!  "), "weird-title");
        assert_eq!(slugify("???"), "section");
    }

    #[test]
    fn test_approximate_tokens() {
        assert_eq!(approximate_tokens(""), 0);
        assert_eq!(approximate_tokens("abcd"), 1);
        assert_eq!(approximate_tokens("abcde"), 2);
    }
}
