//! Sentence-aware chunking with provenance metadata.
//!
//! A document's pages are joined into one text, split into sentence
//! segments, and accumulated into chunks of roughly the configured token
//! budget with a token overlap between consecutive chunks. Chunk text is
//! always an exact byte slice of the joined document, so the ordered chunks
//! (minus overlap) cover the full text with no gaps and every quote check
//! against a chunk is a check against the source verbatim.

use crate::sections;
use crate::types::{ChunkRecord, ParsedDocument};
use coverqa_core::config::ChunkingSettings;
use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;

/// Estimate token count from character count (roughly 4 chars per token
/// for English policy text).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// A contiguous sentence segment of the joined document text.
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: usize,
    end: usize,
    tokens: usize,
}

/// Chunk a parsed document into overlapping, provenance-tagged pieces.
///
/// Returns an empty vector when the document has no extractable text;
/// callers treat that as a per-document parse failure.
pub fn chunk_document(doc: &ParsedDocument, settings: &ChunkingSettings) -> Vec<ChunkRecord> {
    let empty_pages = doc.pages.iter().filter(|p| p.text.trim().is_empty()).count();
    if empty_pages > 0 {
        tracing::debug!(
            "Document '{}': skipping {} empty page(s)",
            doc.filename,
            empty_pages
        );
    }

    let full_text = doc
        .pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    if full_text.trim().is_empty() {
        tracing::warn!("Document '{}' has no extractable text", doc.filename);
        return vec![];
    }

    let page_map = build_page_map(doc);
    let headings = detect_headings(doc);
    let segments = split_segments(&full_text, settings.max_tokens);

    let mut chunks = Vec::new();
    let mut i = 0;

    while i < segments.len() {
        let start_idx = i;
        let mut tokens = 0;

        while i < segments.len() && tokens + segments[i].tokens <= settings.target_tokens {
            tokens += segments[i].tokens;
            i += 1;
        }

        // A single segment above the target still becomes its own chunk;
        // split_segments already bounded it to max_tokens.
        if i == start_idx {
            tokens = segments[i].tokens;
            i += 1;
        }

        let char_start = segments[start_idx].start;
        let char_end = segments[i - 1].end;
        let text = &full_text[char_start..char_end];

        let position = chunks.len() as u32;
        chunks.push(ChunkRecord {
            chunk_id: chunk_id(&doc.id, char_start),
            document_id: doc.id.clone(),
            filename: doc.filename.clone(),
            page_start: page_for_offset(&page_map, char_start),
            page_end: page_for_offset(&page_map, char_end.saturating_sub(1)),
            section: section_for_offset(&headings, char_start),
            text: text.to_string(),
            token_count: tokens,
            position,
        });

        // Rewind so the next chunk re-reads ~overlap_tokens from the tail
        // of this one. Never rewind past the second segment of the chunk,
        // or the loop would stall.
        if i < segments.len() {
            let mut rewind_tokens = 0;
            let mut rewind_count = 0;
            let mut j = i;
            while j > start_idx && rewind_tokens < settings.overlap_tokens {
                j -= 1;
                rewind_tokens += segments[j].tokens;
                rewind_count += 1;
            }
            i = (i - rewind_count).max(start_idx + 1);
        }
    }

    tracing::debug!(
        "Document '{}': {} chunks, avg {} tokens",
        doc.filename,
        chunks.len(),
        chunks.iter().map(|c| c.token_count).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

/// Stable chunk identifier from document id and byte offset.
fn chunk_id(document_id: &str, char_start: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(b":");
    hasher.update(char_start.to_string().as_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest, 16)
}

/// Stable document identifier from the source filename.
pub fn document_id(filename: &str) -> String {
    let digest = Sha256::digest(filename.as_bytes());
    hex_prefix(&digest, 12)
}

fn hex_prefix(digest: &[u8], len: usize) -> String {
    use std::fmt::Write;

    let mut s = String::with_capacity(len);
    for byte in digest {
        let _ = write!(s, "{:02x}", byte);
        if s.len() >= len {
            break;
        }
    }
    s.truncate(len);
    s
}

/// Split the joined text into contiguous sentence segments, further
/// splitting any single sentence that exceeds the max token bound.
fn split_segments(full_text: &str, max_tokens: usize) -> Vec<Segment> {
    let max_bytes = max_tokens.saturating_mul(4).max(16);
    let mut segments = Vec::new();
    let mut offset = 0;

    for sentence in full_text.split_sentence_bounds() {
        let start = offset;
        offset += sentence.len();

        let tokens = estimate_tokens(sentence);
        if tokens <= max_tokens {
            segments.push(Segment {
                start,
                end: offset,
                tokens,
            });
            continue;
        }

        // Degenerate sentence (tables, run-on OCR text): hard-split at
        // char boundaries.
        let mut piece_start = start;
        while piece_start < offset {
            let mut piece_end = (piece_start + max_bytes).min(offset);
            while piece_end < offset && !full_text.is_char_boundary(piece_end) {
                piece_end += 1;
            }
            segments.push(Segment {
                start: piece_start,
                end: piece_end,
                tokens: estimate_tokens(&full_text[piece_start..piece_end]),
            });
            piece_start = piece_end;
        }
    }

    segments
}

/// Byte offset in the joined text where each page starts.
fn build_page_map(doc: &ParsedDocument) -> Vec<(u32, usize)> {
    let mut map = Vec::with_capacity(doc.pages.len());
    let mut offset = 0;
    for page in &doc.pages {
        map.push((page.page_number, offset));
        offset += page.text.len() + 1; // joining newline
    }
    map
}

/// 1-based page number containing the given byte offset.
fn page_for_offset(page_map: &[(u32, usize)], offset: usize) -> u32 {
    let mut result = page_map.first().map(|(p, _)| *p).unwrap_or(1);
    for &(page, start) in page_map {
        if start > offset {
            break;
        }
        result = page;
    }
    result
}

/// Byte offset and label of every detected heading, in document order.
fn detect_headings(doc: &ParsedDocument) -> Vec<(usize, String)> {
    let mut marks = Vec::new();
    let mut offset = 0;

    for page in &doc.pages {
        let mut line_start = offset;
        for line in page.text.split('\n') {
            if sections::is_heading(line) {
                marks.push((line_start, sections::clean_heading(line)));
            }
            line_start += line.len() + 1;
        }
        offset += page.text.len() + 1;
    }

    marks
}

/// Label of the nearest heading at or before the given offset.
fn section_for_offset(headings: &[(usize, String)], offset: usize) -> String {
    let mut current = sections::PREAMBLE.to_string();
    for (mark_offset, label) in headings {
        if *mark_offset > offset {
            break;
        }
        current = label.clone();
    }
    current
}
