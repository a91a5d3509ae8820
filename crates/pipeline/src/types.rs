//! Shared types for the question-answering pipeline.

use serde::{Deserialize, Serialize};

/// Coverage verdict for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Yes,
    No,
    Partial,
    Unknown,
}

impl Verdict {
    /// Parse a verdict string leniently (case-insensitive, trimmed).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "yes" => Some(Verdict::Yes),
            "no" => Some(Verdict::No),
            "partial" => Some(Verdict::Partial),
            "unknown" => Some(Verdict::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Yes => "Yes",
            Verdict::No => "No",
            Verdict::Partial => "Partial",
            Verdict::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

/// One page of a parsed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    /// 1-based page number
    pub page_number: u32,

    /// Raw extracted text (may be empty for scanned pages)
    pub text: String,
}

/// A parsed document ready for chunking. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    /// Stable identifier derived from the filename
    pub id: String,

    /// Source filename
    pub filename: String,

    /// Pages in document order
    pub pages: Vec<PageRecord>,
}

/// A text chunk with full provenance metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Stable content-derived identifier
    pub chunk_id: String,

    /// Owning document id
    pub document_id: String,

    /// Source filename
    pub filename: String,

    /// First page the chunk text appears on (1-based)
    pub page_start: u32,

    /// Last page the chunk text appears on
    pub page_end: u32,

    /// Nearest preceding section heading, or "Preamble"
    pub section: String,

    /// Chunk text
    pub text: String,

    /// Estimated token count
    pub token_count: usize,

    /// Position index within the document (0-based)
    pub position: u32,
}

/// One question expanded into retrieval queries.
///
/// `queries[0]` is always the original question; the rest are distinct
/// paraphrases after normalization.
#[derive(Debug, Clone)]
pub struct ExpandedQuery {
    pub question: String,
    pub queries: Vec<String>,
}

impl ExpandedQuery {
    /// Expansion set containing only the original question.
    pub fn singleton(question: impl Into<String>) -> Self {
        let question = question.into();
        let queries = vec![question.clone()];
        Self { question, queries }
    }
}

/// A retrieved chunk with its fused relevance score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: ChunkRecord,

    /// Fused score: best cosine similarity across the queries that hit it
    pub score: f32,

    /// Which expanded queries retrieved this chunk
    pub matched_queries: Vec<String>,
}

/// A verified citation backing an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub filename: String,
    pub page: u32,
    pub section: String,
    pub quote: String,
}

/// Timing and provenance metadata attached to every answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerMeta {
    pub question: String,
    pub retrieval_time_s: f64,
    pub generation_time_s: f64,
    pub total_time_s: f64,
    pub chunks_used: usize,
    pub model: String,
}

/// Final structured answer. Constructed once per question, immutable
/// after return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: Verdict,
    pub explanation: String,
    pub confidence: f32,
    pub citations: Vec<Citation>,
    pub caveats: Vec<String>,

    #[serde(rename = "_meta")]
    pub meta: AnswerMeta,
}

/// Index statistics for health reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents: u64,
    pub chunks: u64,
    pub dimension: usize,
}

/// A per-document ingestion failure. Other documents still index.
#[derive(Debug, Clone)]
pub struct DocumentFailure {
    pub filename: String,
    pub error: String,
}

/// Outcome of indexing a corpus directory.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub documents_indexed: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<DocumentFailure>,
}
