//! Citation verification against supplied chunk text.
//!
//! A quote counts as grounded only if it appears in a chunk that was
//! actually given to the synthesizer, after whitespace normalization,
//! either exactly or within a small edit-distance budget that absorbs
//! OCR artifacts. The budget is deliberately tight: it must never let a
//! paraphrase pass as a verbatim quote.

use crate::types::{ChunkRecord, Citation, ScoredChunk};

/// Minimum quote length (normalized chars) before edit-distance slack is
/// allowed; shorter quotes must match exactly.
const FUZZY_MIN_CHARS: usize = 30;

/// Edit budget: one edit per 20 chars of quote, capped.
const FUZZY_DIVISOR: usize = 20;
const FUZZY_MAX_EDITS: usize = 12;

/// Check a claimed citation against the chunks supplied to the prompt.
///
/// Chunk matching prefers filename plus page-range, then falls back to
/// filename alone (models often report the start page of a spanning
/// chunk). Returns the verified citation with provenance corrected from
/// the matching chunk, or `None` if no supplied chunk contains the quote.
pub fn verify_citation(citation: &Citation, supplied: &[ScoredChunk]) -> Option<Citation> {
    let quote = normalize_whitespace(&citation.quote);
    if quote.is_empty() {
        return None;
    }

    let mut candidates: Vec<&ChunkRecord> = supplied
        .iter()
        .map(|s| &s.chunk)
        .filter(|c| {
            c.filename == citation.filename
                && citation.page >= c.page_start
                && citation.page <= c.page_end
        })
        .collect();

    if candidates.is_empty() {
        candidates = supplied
            .iter()
            .map(|s| &s.chunk)
            .filter(|c| c.filename == citation.filename)
            .collect();
    }
    if candidates.is_empty() {
        // Model invented or garbled the filename; check every chunk before
        // giving up, the quote is what actually grounds the claim.
        candidates = supplied.iter().map(|s| &s.chunk).collect();
    }

    for chunk in candidates {
        if quote_matches(&quote, &chunk.text) {
            return Some(Citation {
                filename: chunk.filename.clone(),
                page: chunk.page_start,
                section: chunk.section.clone(),
                quote: citation.quote.trim().to_string(),
            });
        }
    }

    None
}

/// True if the normalized quote appears in the chunk text, exactly or
/// within the edit budget.
pub fn quote_matches(normalized_quote: &str, chunk_text: &str) -> bool {
    let haystack = normalize_whitespace(chunk_text);
    if haystack.contains(normalized_quote) {
        return true;
    }

    let quote_chars = normalized_quote.chars().count();
    if quote_chars < FUZZY_MIN_CHARS {
        return false;
    }

    let budget = (quote_chars / FUZZY_DIVISOR).min(FUZZY_MAX_EDITS);
    substring_edit_distance(normalized_quote, &haystack) <= budget
}

/// Collapse all whitespace runs to single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Minimum edit distance between `needle` and any substring of
/// `haystack` (approximate string matching: deletions from the haystack
/// before and after the match are free).
fn substring_edit_distance(needle: &str, haystack: &str) -> usize {
    let needle: Vec<char> = needle.chars().collect();
    let haystack: Vec<char> = haystack.chars().collect();

    if needle.is_empty() {
        return 0;
    }
    if haystack.is_empty() {
        return needle.len();
    }

    // Classic approximate-matching DP: column 0 stays free so the match
    // may start at any haystack position, and the answer is the best
    // final-column value so it may end anywhere too.
    let mut prev: Vec<usize> = (0..=needle.len()).collect();
    let mut curr = vec![0usize; needle.len() + 1];

    let mut best = prev[needle.len()];
    for &h in &haystack {
        curr[0] = 0;
        for i in 1..=needle.len() {
            let substitution = prev[i - 1] + usize::from(needle[i - 1] != h);
            let deletion = prev[i] + 1;
            let insertion = curr[i - 1] + 1;
            curr[i] = substitution.min(deletion).min(insertion);
        }
        best = best.min(curr[needle.len()]);
        std::mem::swap(&mut prev, &mut curr);
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkRecord;

    fn supplied(text: &str) -> Vec<ScoredChunk> {
        vec![ScoredChunk {
            chunk: ChunkRecord {
                chunk_id: "c1".to_string(),
                document_id: "d1".to_string(),
                filename: "policy.pdf".to_string(),
                page_start: 4,
                page_end: 5,
                section: "Benefits".to_string(),
                text: text.to_string(),
                token_count: 20,
                position: 0,
            },
            score: 0.8,
            matched_queries: vec![],
        }]
    }

    fn citation(quote: &str) -> Citation {
        Citation {
            filename: "policy.pdf".to_string(),
            page: 4,
            section: "Benefits".to_string(),
            quote: quote.to_string(),
        }
    }

    #[test]
    fn test_exact_quote_verifies() {
        let chunks = supplied("Knee arthroscopy is covered after a 12-month waiting period.");
        let verified = verify_citation(
            &citation("Knee arthroscopy is covered after a 12-month waiting period."),
            &chunks,
        );
        assert!(verified.is_some());
    }

    #[test]
    fn test_whitespace_differences_tolerated() {
        let chunks = supplied("Knee  arthroscopy is\ncovered after a   12-month waiting period.");
        let verified = verify_citation(
            &citation("Knee arthroscopy is covered after a 12-month waiting period."),
            &chunks,
        );
        assert!(verified.is_some());
    }

    #[test]
    fn test_small_ocr_artifact_tolerated() {
        // One character differs in a 60-char quote: within budget
        let chunks = supplied("Knee arthroscopy is covered after a l2-month waiting period here.");
        let verified = verify_citation(
            &citation("Knee arthroscopy is covered after a 12-month waiting period here."),
            &chunks,
        );
        assert!(verified.is_some());
    }

    #[test]
    fn test_paraphrase_rejected() {
        let chunks = supplied("Knee arthroscopy is covered after a 12-month waiting period.");
        let verified = verify_citation(
            &citation("Surgery on the knee is included once twelve months have passed."),
            &chunks,
        );
        assert!(verified.is_none());
    }

    #[test]
    fn test_fabricated_quote_rejected() {
        let chunks = supplied("Dental treatment is excluded from coverage entirely.");
        let verified = verify_citation(&citation("Cosmetic surgery is fully covered."), &chunks);
        assert!(verified.is_none());
    }

    #[test]
    fn test_short_quote_requires_exact_match() {
        let chunks = supplied("A grace period of thirty days applies.");
        // Short quote with one edit must fail
        assert!(verify_citation(&citation("grace period of thirtx"), &chunks).is_none());
        assert!(verify_citation(&citation("grace period of thirty"), &chunks).is_some());
    }

    #[test]
    fn test_empty_quote_rejected() {
        let chunks = supplied("Some policy text.");
        assert!(verify_citation(&citation("   "), &chunks).is_none());
    }

    #[test]
    fn test_wrong_page_falls_back_to_filename_match() {
        let chunks = supplied("Knee arthroscopy is covered after a 12-month waiting period.");
        let mut c = citation("Knee arthroscopy is covered after a 12-month waiting period.");
        c.page = 99;

        let verified = verify_citation(&c, &chunks).expect("quote grounds the claim");
        // Provenance corrected from the matching chunk
        assert_eq!(verified.page, 4);
        assert_eq!(verified.section, "Benefits");
    }

    #[test]
    fn test_substring_edit_distance() {
        assert_eq!(substring_edit_distance("abc", "xxabcxx"), 0);
        assert_eq!(substring_edit_distance("abc", "xxabxcx"), 1);
        assert_eq!(substring_edit_distance("abc", ""), 3);
        assert_eq!(substring_edit_distance("", "anything"), 0);
    }
}
