//! Stage 3: chapter chunking
//!
//! Splits the extracted full text into ordered chunks along chapter
//! boundaries, falling back to page-range partitioning when no chapter
//! structure is detected. Every character of input lands in exactly one
//! chunk; chunk ids are dense from 1 and slugs are unique within the set.

use crate::config::ChunkingConfig;
use crate::error::{Result, SkillsmithError};
use crate::types::{slugify, Chunk, ExtractionRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, info};

static CHAPTER_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*chapter\s+(\d{1,3})\b[\s:.\-]*(.{0,100})$").expect("chapter regex")
});

static NUMBERED_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(\d{1,3})\.\s+([A-Z][^\n]{3,90})$").expect("section regex")
});

/// A detected chapter boundary inside the full text
#[derive(Debug, Clone)]
struct Boundary {
    /// Byte offset of the heading line start
    offset: usize,
    chapter_number: u32,
    title: String,
}

/// Stage 3 chunker
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Create a chunker with default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chunker with custom thresholds
    pub fn with_config(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Split an extraction record into ordered chunks
    pub fn chunk(&self, extraction: &ExtractionRecord) -> Result<Vec<Chunk>> {
        let text = &extraction.full_text;
        if text.trim().is_empty() {
            return Err(SkillsmithError::pipeline(
                "cannot chunk an empty extraction",
            ));
        }

        let boundaries = detect_boundaries(text);
        let mut pieces = if !boundaries.is_empty() {
            debug!("Detected {} chapter boundaries", boundaries.len());
            split_at_boundaries(text, &boundaries)
        } else {
            debug!("No chapter structure detected; partitioning by pages");
            self.split_by_pages(extraction)
        };

        // Drop empty pieces, then merge too-short pieces backward so
        // every surviving chunk clears the minimum length.
        pieces.retain(|p| !p.text.trim().is_empty());
        let pieces = self.merge_short_pieces(pieces);

        if pieces.is_empty() {
            return Err(SkillsmithError::pipeline("chunking produced no chunks"));
        }

        let mut slug_counts: HashMap<String, usize> = HashMap::new();
        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(index, piece)| {
                let id = (index + 1) as u32;
                let base_slug = slugify(&piece.title);
                let count = slug_counts.entry(base_slug.clone()).or_insert(0);
                *count += 1;
                let slug = if *count == 1 {
                    base_slug
                } else {
                    format!("{}-{}", base_slug, count)
                };
                let char_count = piece.text.len();
                Chunk {
                    id,
                    chapter_number: piece.chapter_number.unwrap_or(id),
                    title: piece.title,
                    slug,
                    text: piece.text,
                    char_count,
                }
            })
            .collect();

        info!(
            "Chunked {} chars into {} chunks",
            text.len(),
            chunks.len()
        );
        Ok(chunks)
    }

    fn split_by_pages(&self, extraction: &ExtractionRecord) -> Vec<Piece> {
        let per_chunk = self.config.pages_per_chunk.max(1);
        extraction
            .pages
            .chunks(per_chunk)
            .map(|group| {
                let first = group.first().map(|p| p.page_number).unwrap_or(1);
                let last = group.last().map(|p| p.page_number).unwrap_or(first);
                let title = if first == last {
                    format!("Page {}", first)
                } else {
                    format!("Pages {}-{}", first, last)
                };
                let text = group
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                Piece {
                    title,
                    chapter_number: None,
                    text,
                }
            })
            .collect()
    }

    fn merge_short_pieces(&self, pieces: Vec<Piece>) -> Vec<Piece> {
        let min = self.config.min_chunk_chars;
        let mut merged: Vec<Piece> = Vec::with_capacity(pieces.len());
        for piece in pieces {
            if piece.text.len() < min {
                if let Some(previous) = merged.last_mut() {
                    previous.text.push('\n');
                    previous.text.push_str(&piece.text);
                    continue;
                }
            }
            merged.push(piece);
        }
        // A short leading piece had no previous chunk to merge into;
        // fold it forward instead.
        if merged.len() >= 2 && merged[0].text.len() < min {
            let head = merged.remove(0);
            let next = &mut merged[0];
            next.text = format!("{}\n{}", head.text, next.text);
        }
        merged
    }
}

#[derive(Debug, Clone)]
struct Piece {
    title: String,
    chapter_number: Option<u32>,
    text: String,
}

fn detect_boundaries(text: &str) -> Vec<Boundary> {
    let mut boundaries: Vec<Boundary> = CHAPTER_HEADING
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number: u32 = caps.get(1)?.as_str().parse().ok()?;
            let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            let title = if rest.is_empty() {
                format!("Chapter {}", number)
            } else {
                format!("Chapter {} {}", number, rest)
            };
            Some(Boundary {
                offset: whole.start(),
                chapter_number: number,
                title,
            })
        })
        .collect();

    if boundaries.is_empty() {
        // A lone numbered line is more likely a list item than a
        // section heading; require at least two before trusting them
        let numbered: Vec<Boundary> = NUMBERED_SECTION
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let number: u32 = caps.get(1)?.as_str().parse().ok()?;
                let title = caps.get(2)?.as_str().trim().to_string();
                Some(Boundary {
                    offset: whole.start(),
                    chapter_number: number,
                    title,
                })
            })
            .collect();
        if numbered.len() >= 2 {
            boundaries = numbered;
        }
    }

    boundaries.sort_by_key(|b| b.offset);
    boundaries.dedup_by_key(|b| b.offset);
    boundaries
}

fn split_at_boundaries(text: &str, boundaries: &[Boundary]) -> Vec<Piece> {
    let mut pieces = Vec::with_capacity(boundaries.len() + 1);

    // Text before the first chapter heading becomes an introduction
    let first_offset = boundaries[0].offset;
    if first_offset > 0 {
        pieces.push(Piece {
            title: "Introduction".to_string(),
            chapter_number: None,
            text: text[..first_offset].to_string(),
        });
    }

    for (index, boundary) in boundaries.iter().enumerate() {
        let end = boundaries
            .get(index + 1)
            .map(|b| b.offset)
            .unwrap_or(text.len());
        pieces.push(Piece {
            title: boundary.title.clone(),
            chapter_number: Some(boundary.chapter_number),
            text: text[boundary.offset..end].to_string(),
        });
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageText;
    use std::path::PathBuf;

    fn extraction_from_pages(texts: &[&str]) -> ExtractionRecord {
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

    fn filler(label: &str) -> String {
        format!("{} ", label).repeat(120)
    }

    fn normalize_ws(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_chapter_detection_splits_chunks() {
        let text = format!(
            "Preamble about this guide. {}\nChapter 1: Employment Income\n{}\nChapter 2: Deductions\n{}",
            filler("intro"),
            filler("employment"),
            filler("deductions")
        );
        let extraction = extraction_from_pages(&[text.as_str()]);
        let chunks = Chunker::new().chunk(&extraction).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].title, "Introduction");
        assert_eq!(chunks[1].title, "Chapter 1 Employment Income");
        assert_eq!(chunks[1].chapter_number, 1);
        assert_eq!(chunks[2].chapter_number, 2);
    }

    #[test]
    fn test_chunk_ids_are_dense_and_slugs_unique() {
        let text = format!(
            "Chapter 1: Credits\n{}\nChapter 2: Credits\n{}\nChapter 3: Credits\n{}",
            filler("a"),
            filler("b"),
            filler("c")
        );
        let extraction = extraction_from_pages(&[text.as_str()]);
        let chunks = Chunker::new().chunk(&extraction).unwrap();

        let ids: Vec<u32> = chunks.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let mut slugs: Vec<&str> = chunks.iter().map(|c| c.slug.as_str()).collect();
        slugs.sort_unstable();
        slugs.dedup();
        assert_eq!(slugs.len(), chunks.len());
        assert!(chunks.iter().any(|c| c.slug.ends_with("-2")));
    }

    #[test]
    fn test_no_characters_lost() {
        let text = format!(
            "Chapter 1: One\n{}\nChapter 2: Two\n{}",
            filler("alpha"),
            filler("beta")
        );
        let extraction = extraction_from_pages(&[text.as_str()]);
        let chunks = Chunker::new().chunk(&extraction).unwrap();

        let rejoined: String = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(normalize_ws(&rejoined), normalize_ws(&text));
    }

    #[test]
    fn test_fallback_to_page_ranges() {
        let pages: Vec<String> = (0..10).map(|i| filler(&format!("page{}", i))).collect();
        let refs: Vec<&str> = pages.iter().map(String::as_str).collect();
        let extraction = extraction_from_pages(&refs);
        let chunks = Chunker::new().chunk(&extraction).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].title, "Pages 1-5");
        assert_eq!(chunks[1].title, "Pages 6-10");
        // Chapter number defaults to the chunk id when not detected
        assert_eq!(chunks[0].chapter_number, 1);
        assert_eq!(chunks[1].chapter_number, 2);
    }

    #[test]
    fn test_single_chapter_yields_single_chunk() {
        let text = format!("Chapter 1: The Only Chapter\n{}", filler("body"));
        let extraction = extraction_from_pages(&[text.as_str()]);
        let chunks = Chunker::new().chunk(&extraction).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, 1);
        assert_eq!(chunks[0].chapter_number, 1);
        assert_eq!(chunks[0].title, "Chapter 1 The Only Chapter");
    }

    #[test]
    fn test_headingless_text_yields_single_chunk() {
        let text = filler("plain body of text");
        let extraction = extraction_from_pages(&[text.as_str()]);
        let chunks = Chunker::new().chunk(&extraction).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, 1);
    }

    #[test]
    fn test_short_chunks_merge_into_previous() {
        let text = format!(
            "Chapter 1: Long\n{}\nChapter 2: Tiny\nshort.\nChapter 3: Also Long\n{}",
            filler("long"),
            filler("alsolong")
        );
        let extraction = extraction_from_pages(&[text.as_str()]);
        let chunks = Chunker::new().chunk(&extraction).unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.contains("Tiny"));
    }

    #[test]
    fn test_short_intro_merges_forward() {
        let text = format!(
            "tiny intro\nChapter 1: First\n{}\nChapter 2: Second\n{}",
            filler("first"),
            filler("second")
        );
        let extraction = extraction_from_pages(&[text.as_str()]);
        let chunks = Chunker::new().chunk(&extraction).unwrap();

        assert_eq!(chunks[0].title, "Chapter 1 First");
        assert!(chunks[0].text.contains("tiny intro"));
    }

    #[test]
    fn test_char_count_matches_text() {
        let text = format!("Chapter 1: A\n{}\nChapter 2: B\n{}", filler("x"), filler("y"));
        let extraction = extraction_from_pages(&[text.as_str()]);
        for chunk in Chunker::new().chunk(&extraction).unwrap() {
            assert_eq!(chunk.char_count, chunk.text.len());
        }
    }

    #[test]
    fn test_numbered_sections_detected_without_chapter_keyword() {
        let text = format!(
            "1. Filing Your Return\n{}\n2. Paying Your Balance\n{}",
            filler("filing"),
            filler("paying")
        );
        let extraction = extraction_from_pages(&[text.as_str()]);
        let chunks = Chunker::new().chunk(&extraction).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].title, "Filing Your Return");
        assert_eq!(chunks[0].chapter_number, 1);
    }
}
