//! Stage 2: document classification
//!
//! Assigns the document a primary category from the closed set, scores
//! five quality metrics, and collects matched keywords. The preferred
//! strategy asks an LLM provider for a JSON verdict; a deterministic
//! keyword scorer is both the fallback and the source of the keyword
//! list. Classification never fails the pipeline: any provider problem
//! degrades to the fallback path.

use crate::prompts::PromptTemplates;
use crate::providers::Provider;
use crate::types::{
    Category, ClassificationRecord, ExtractionRecord, QualityMetrics, ScoredCategory,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

/// Characters of full text forwarded to the LLM
const EXCERPT_CHARS: usize = 6_000;

/// Keyword table backing the deterministic scorer
static CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::EmploymentIncome,
        &[
            "employment income",
            "t4 slip",
            "salary",
            "wages",
            "payroll",
            "employer",
            "commission income",
        ],
    ),
    (
        Category::SelfEmployment,
        &[
            "self-employed",
            "self-employment",
            "business income",
            "t2125",
            "sole proprietor",
            "professional income",
        ],
    ),
    (
        Category::Deductions,
        &[
            "deduction",
            "deductible",
            "moving expenses",
            "child care expenses",
            "union dues",
            "carrying charges",
        ],
    ),
    (
        Category::Credits,
        &[
            "tax credit",
            "non-refundable",
            "disability tax credit",
            "gst/hst credit",
            "tuition",
            "medical expenses",
        ],
    ),
    (
        Category::Investments,
        &[
            "capital gains",
            "capital loss",
            "dividends",
            "t5 slip",
            "interest income",
            "adjusted cost base",
        ],
    ),
    (
        Category::Retirement,
        &[
            "rrsp",
            "rrif",
            "pension income",
            "canada pension plan",
            "old age security",
            "retirement",
        ],
    ),
    (
        Category::Benefits,
        &[
            "canada child benefit",
            "employment insurance",
            "benefit payment",
            "climate action incentive",
            "workers benefit",
        ],
    ),
    (
        Category::SmallBusiness,
        &[
            "corporation",
            "t2 return",
            "small business",
            "payroll deductions",
            "input tax credit",
            "ccpc",
        ],
    ),
    (
        Category::General,
        &[
            "income tax",
            "tax return",
            "canada revenue agency",
            "filing deadline",
            "notice of assessment",
        ],
    ),
];

static FORM_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:T\d{1,4}[A-Z]?|Schedule\s+\d+)\b").expect("form regex"));

/// Stage 2 classifier
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    templates: PromptTemplates,
}

impl Classifier {
    /// Create a classifier with the default prompt templates
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a classifier with custom templates
    pub fn with_templates(templates: PromptTemplates) -> Self {
        Self { templates }
    }

    /// Classify an extraction record
    ///
    /// Tries the provider first when one is supplied; every failure mode
    /// (invocation error, unparseable JSON, empty keyword list) degrades
    /// to the deterministic fallback.
    pub async fn classify(
        &self,
        extraction: &ExtractionRecord,
        provider: Option<&dyn Provider>,
    ) -> ClassificationRecord {
        if let Some(provider) = provider {
            match self.classify_with_provider(extraction, provider).await {
                Ok(record) => {
                    info!(
                        "Classified as {} (confidence {:.2}) via {}",
                        record.primary_category,
                        record.confidence,
                        provider.name()
                    );
                    return record;
                }
                Err(reason) => {
                    warn!(
                        "Provider classification via {} failed ({}); using keyword fallback",
                        provider.name(),
                        reason
                    );
                }
            }
        }

        let record = self.classify_by_keywords(&extraction.full_text);
        info!(
            "Classified as {} (confidence {:.2}) via keyword fallback",
            record.primary_category, record.confidence
        );
        record
    }

    async fn classify_with_provider(
        &self,
        extraction: &ExtractionRecord,
        provider: &dyn Provider,
    ) -> Result<ClassificationRecord, String> {
        let excerpt = truncate_on_char_boundary(&extraction.full_text, EXCERPT_CHARS);
        let categories: Vec<&str> = Category::all().iter().map(|c| c.as_str()).collect();
        let prompt = self.templates.classification_prompt(excerpt, &categories);

        let response = provider
            .invoke(&prompt)
            .await
            .map_err(|e| e.to_string())?;
        let json = extract_json_object(&response).ok_or("no JSON object in response")?;
        let record: ClassificationRecord =
            serde_json::from_str(json).map_err(|e| format!("JSON parse: {}", e))?;
        let mut record = record.normalized();

        if record.keywords.is_empty() {
            // The keyword list is contractually non-empty; backfill from
            // the deterministic scorer rather than rejecting the verdict.
            record.keywords = self.classify_by_keywords(&extraction.full_text).keywords;
        }
        Ok(record)
    }

    /// Deterministic keyword-matching classification
    pub fn classify_by_keywords(&self, text: &str) -> ClassificationRecord {
        let lowered = text.to_lowercase();

        let mut scored: Vec<(Category, usize, Vec<String>)> = CATEGORY_KEYWORDS
            .iter()
            .map(|(category, keywords)| {
                let mut hits = 0usize;
                let mut matched = Vec::new();
                for keyword in *keywords {
                    let count = lowered.matches(keyword).count();
                    if count > 0 {
                        hits += count;
                        matched.push((*keyword).to_string());
                    }
                }
                (*category, hits, matched)
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        let total_hits: usize = scored.iter().map(|(_, hits, _)| hits).sum();
        debug!("Keyword scorer saw {} total hits", total_hits);

        if total_hits == 0 {
            return ClassificationRecord {
                primary_category: Category::General,
                confidence: 0.25,
                secondary_categories: Vec::new(),
                quality: quality_from_text(text, 0, 0.0),
                keywords: vec!["income tax".to_string()],
            }
            .normalized();
        }

        let (primary, primary_hits, mut keywords) = scored.remove(0);
        let share = primary_hits as f64 / total_hits as f64;
        let confidence = (0.3 + 0.7 * share).clamp(0.0, 1.0);

        let secondary_categories: Vec<ScoredCategory> = scored
            .iter()
            .filter(|(_, hits, _)| *hits > 0)
            .take(3)
            .map(|(category, hits, _)| ScoredCategory {
                category: *category,
                confidence: *hits as f64 / total_hits as f64,
            })
            .collect();

        for (_, hits, matched) in &scored {
            if *hits > 0 {
                keywords.extend(matched.iter().cloned());
            }
        }
        keywords.truncate(20);

        let distinct = keywords.len();
        ClassificationRecord {
            primary_category: primary,
            confidence,
            secondary_categories,
            quality: quality_from_text(text, distinct, share),
            keywords,
        }
        .normalized()
    }
}

/// Heuristic quality metrics for the fallback path
fn quality_from_text(text: &str, distinct_keywords: usize, primary_share: f64) -> QualityMetrics {
    let completeness = (text.len() as f64 / 150_000.0).min(1.0);
    let accuracy = (0.5 + 0.03 * distinct_keywords as f64).min(1.0);
    let relevance = if primary_share > 0.0 {
        (0.4 + 0.6 * primary_share).min(1.0)
    } else {
        0.3
    };

    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let clarity = if lines.is_empty() {
        0.0
    } else {
        let readable = lines
            .iter()
            .filter(|l| (20..=120).contains(&l.trim().len()))
            .count();
        (0.3 + 0.7 * readable as f64 / lines.len() as f64).min(1.0)
    };

    let form_mentions = FORM_PATTERN.find_iter(text).count();
    let practicality = (form_mentions as f64 / 20.0).min(1.0);

    QualityMetrics {
        completeness,
        accuracy,
        relevance,
        clarity,
        practicality,
    }
    .clamped()
}

/// Slice a string at a char boundary at or below `max_len` bytes
fn truncate_on_char_boundary(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }
    let mut end = max_len;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Extract the first balanced JSON object from a response
///
/// Providers wrap verdicts in prose or code fences often enough that a
/// plain `serde_json::from_str` on the whole response is not viable.
fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in response[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&response[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
