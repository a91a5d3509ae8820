//! Coverage question answering over policy documents.
//!
//! Leaf to root: the chunker turns parsed documents into overlapping,
//! provenance-tagged text units; the semantic index stores one embedding
//! per chunk and answers cosine-similarity queries; the query expander
//! turns one question into several retrieval queries; the retriever fans
//! the queries out and fuses the results; the synthesizer produces a
//! structured answer whose every citation is verified against the chunks
//! it was given.

pub mod chunker;
pub mod document;
pub mod expand;
pub mod index;
pub mod pipeline;
pub mod retriever;
pub mod sections;
pub mod synth;
pub mod types;
pub mod verify;

pub use index::SemanticIndex;
pub use pipeline::Pipeline;
pub use types::{
    Answer, AnswerMeta, ChunkRecord, Citation, ExpandedQuery, IndexStats, IngestReport,
    ParsedDocument, ScoredChunk, Verdict,
};
