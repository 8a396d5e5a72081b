//! Stage 1: PDF text extraction
//!
//! Byte-level text extraction is delegated to the `pdf-extract` crate;
//! this module owns page ordering, character/line counting, and the
//! assembly invariant (contiguous page numbers, full text equals the
//! ordered page join).

use crate::error::{Result, SkillsmithError};
use crate::hash::fingerprint;
use crate::types::{ExtractionRecord, PageText};
use std::path::Path;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

/// Stage 1 extractor
#[derive(Debug, Clone, Default)]
pub struct PdfExtractor {
    /// Cap on the number of pages extracted; `None` extracts everything
    pub max_pages: Option<usize>,
}

impl PdfExtractor {
    /// Create an extractor with no page cap
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an extractor that stops after `max_pages` pages
    pub fn with_max_pages(max_pages: usize) -> Self {
        Self {
            max_pages: Some(max_pages),
        }
    }

    /// Read a PDF from disk and extract its pages
    pub async fn extract_file<P: AsRef<Path>>(&self, path: P) -> Result<ExtractionRecord> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            SkillsmithError::extraction(
                path.display().to_string(),
                format!("failed to read file: {}", e),
            )
        })?;
        self.extract_bytes(path, &bytes)
    }

    /// Extract pages from in-memory PDF bytes
    ///
    /// The record's fingerprint is computed over the raw bytes; it keys
    /// every downstream cache artifact for this PDF.
    pub fn extract_bytes(&self, source_path: &Path, bytes: &[u8]) -> Result<ExtractionRecord> {
        let fp = fingerprint(bytes);
        debug!(
            "Extracting text from {} ({} bytes, fingerprint {})",
            source_path.display(),
            bytes.len(),
            fp
        );

        let raw_pages = pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| {
            SkillsmithError::extraction(
                source_path.display().to_string(),
                format!("PDF parsing failed: {}", e),
            )
        })?;

        let mut pages: Vec<PageText> = Vec::with_capacity(raw_pages.len());
        for (index, raw) in raw_pages.into_iter().enumerate() {
            if let Some(cap) = self.max_pages {
                if index >= cap {
                    debug!("Stopping extraction at page cap {}", cap);
                    break;
                }
            }
            pages.push(PageText::new(index + 1, normalize_pdf_text(&raw)));
        }

        if pages.is_empty() {
            return Err(SkillsmithError::extraction(
                source_path.display().to_string(),
                "no pages extracted",
            ));
        }
        if pages.iter().all(|p| p.text.trim().is_empty()) {
            warn!(
                "Every extracted page of {} is empty",
                source_path.display()
            );
            return Err(SkillsmithError::extraction(
                source_path.display().to_string(),
                "PDF contains no extractable text",
            ));
        }

        let full_text = pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let record = ExtractionRecord {
            source_path: source_path.to_path_buf(),
            fingerprint: fp,
            total_pages: pages.len(),
            full_text,
            pages,
        };
        record.check_invariants()?;

        info!(
            "Extracted {} pages ({} chars) from {}",
            record.total_pages,
            record.full_text.len(),
            source_path.display()
        );
        Ok(record)
    }
}

/// Normalize text extracted from a PDF
///
/// PDFs frequently emit decomposed Unicode and stray carriage returns;
/// NFC recomposition keeps string comparisons and keyword matching
/// consistent across extractor versions.
pub fn normalize_pdf_text(text: &str) -> String {
    text.nfc().collect::<String>().replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_extract_missing_file_fails() {
        let extractor = PdfExtractor::new();
        let err = extractor
            .extract_file("/nonexistent/guide.pdf")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "extraction-failed");
    }

    #[test]
    fn test_extract_corrupt_bytes_fail() {
        let extractor = PdfExtractor::new();
        let err = extractor
            .extract_bytes(&PathBuf::from("corrupt.pdf"), b"this is not a pdf")
            .unwrap_err();
        assert_eq!(err.kind(), "extraction-failed");
    }

    #[test]
    fn test_extract_empty_bytes_fail() {
        let extractor = PdfExtractor::new();
        let err = extractor
            .extract_bytes(&PathBuf::from("empty.pdf"), b"")
            .unwrap_err();
        assert_eq!(err.kind(), "extraction-failed");
    }

    #[test]
    fn test_normalize_pdf_text_nfc() {
        // "é" decomposed (e + combining acute) recomposes to one codepoint
        let decomposed = "cre\u{0301}dit";
        let normalized = normalize_pdf_text(decomposed);
        assert_eq!(normalized, "crédit");
    }

    #[test]
    fn test_normalize_pdf_text_line_endings() {
        assert_eq!(normalize_pdf_text("a\r\nb"), "a\nb");
    }
}
