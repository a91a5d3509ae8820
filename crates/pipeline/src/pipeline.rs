//! Pipeline context object: one instance constructed at process start,
//! shared by reference across concurrent questions.

use crate::document;
use crate::index::{EmbeddedChunk, SemanticIndex};
use crate::synth::Synthesizer;
use crate::types::{
    Answer, AnswerMeta, ChunkRecord, DocumentFailure, IndexStats, IngestReport, ScoredChunk,
};
use crate::{chunker, expand::QueryExpander, retriever::Retriever};
use coverqa_core::{AppConfig, AppResult};
use coverqa_llm::{create_client, create_embedder, EmbeddingProvider, LlmClient};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Chunks embedded per backend call during ingestion.
const EMBED_BATCH_SIZE: usize = 32;

/// The question-answering pipeline.
///
/// Holds the semantic index and backend clients; `answer` takes `&self`
/// and keeps no per-question mutable state, so concurrent questions run
/// independently, bounded only by the backend's own concurrency cap.
pub struct Pipeline {
    config: AppConfig,
    index: Arc<SemanticIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    expander: QueryExpander,
    retriever: Retriever,
    synthesizer: Synthesizer,
}

impl Pipeline {
    /// Construct the pipeline with backends built from configuration.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let client = create_client(&config.llm)?;
        let embedder = create_embedder(&config.llm)?;
        Self::with_backends(config, client, embedder)
    }

    /// Construct the pipeline around caller-supplied backends. This is
    /// the seam tests use to run fully offline.
    pub fn with_backends(
        config: AppConfig,
        client: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        let index = Arc::new(SemanticIndex::open(
            &config.index_path,
            embedder.dimensions(),
        )?);

        let expander = QueryExpander::new(
            client.clone(),
            &config.llm.model,
            config.expansion.variants,
            config.expansion.max_variant_chars,
        );
        let retriever = Retriever::new(
            index.clone(),
            embedder.clone(),
            config.retrieval.per_query_k,
            config.retrieval.min_similarity,
        );
        let synthesizer = Synthesizer::new(
            client.clone(),
            &config.llm.model,
            config.synthesis.clone(),
        );

        Ok(Self {
            config,
            index,
            embedder,
            expander,
            retriever,
            synthesizer,
        })
    }

    /// Answer a coverage question from the indexed corpus.
    ///
    /// Always returns a well-formed `Answer`; every failure mode along
    /// the pipeline degrades to verdict `Unknown` with an explanatory
    /// note rather than erroring.
    pub async fn answer(&self, question: &str, top_k: usize) -> Answer {
        let t_start = Instant::now();
        tracing::info!("Answering: {}", question);

        let expanded = self.expander.expand(question).await;

        let chunks: Vec<ScoredChunk> = match self.retriever.retrieve(&expanded, top_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::error!("Retrieval failed: {} (treating as no evidence)", e);
                vec![]
            }
        };
        let retrieval_time = t_start.elapsed().as_secs_f64();
        tracing::info!("Retrieved {} chunks in {:.2}s", chunks.len(), retrieval_time);

        let t_generation = Instant::now();
        let synthesis = self.synthesizer.synthesize(question, &chunks).await;
        let generation_time = t_generation.elapsed().as_secs_f64();

        Answer {
            answer: synthesis.verdict,
            explanation: synthesis.explanation,
            confidence: synthesis.confidence,
            citations: synthesis.citations,
            caveats: synthesis.caveats,
            meta: AnswerMeta {
                question: question.to_string(),
                retrieval_time_s: round2(retrieval_time),
                generation_time_s: round2(generation_time),
                total_time_s: round2(t_start.elapsed().as_secs_f64()),
                chunks_used: chunks.len(),
                model: self.config.llm.model.clone(),
            },
        }
    }

    /// Chunk, embed, and index every document under `dir`, adding to the
    /// live index. Per-document failures are reported, not fatal.
    pub async fn ingest(&self, dir: &Path) -> AppResult<IngestReport> {
        let load = document::load_corpus(dir)?;
        let mut report = IngestReport {
            failures: load.failures,
            ..Default::default()
        };

        for doc in &load.documents {
            let chunks = chunker::chunk_document(doc, &self.config.chunking);
            if chunks.is_empty() {
                report.failures.push(DocumentFailure {
                    filename: doc.filename.clone(),
                    error: "Document produced no chunks".to_string(),
                });
                continue;
            }

            let embedded = self.embed_chunks(chunks).await?;
            self.index.upsert(&embedded)?;
            report.documents_indexed += 1;
            report.chunks_indexed += embedded.len();
        }

        tracing::info!(
            "Ingest complete: {} documents, {} chunks, {} failure(s)",
            report.documents_indexed,
            report.chunks_indexed,
            report.failures.len()
        );
        Ok(report)
    }

    /// Re-index the corpus from scratch into a staging index, then swap
    /// it in atomically. Readers keep the old index until the swap; a
    /// concurrent rebuild attempt fails fast.
    pub async fn rebuild(&self, dir: &Path) -> AppResult<IngestReport> {
        let rebuild = self.index.begin_rebuild()?;

        let load = document::load_corpus(dir)?;
        let mut report = IngestReport {
            failures: load.failures,
            ..Default::default()
        };

        for doc in &load.documents {
            let chunks = chunker::chunk_document(doc, &self.config.chunking);
            if chunks.is_empty() {
                report.failures.push(DocumentFailure {
                    filename: doc.filename.clone(),
                    error: "Document produced no chunks".to_string(),
                });
                continue;
            }

            let embedded = self.embed_chunks(chunks).await?;
            rebuild.upsert(&embedded)?;
            report.documents_indexed += 1;
            report.chunks_indexed += embedded.len();
        }

        rebuild.commit()?;
        tracing::info!(
            "Rebuild complete: {} documents, {} chunks",
            report.documents_indexed,
            report.chunks_indexed
        );
        Ok(report)
    }

    /// Index statistics for health reporting.
    pub fn stats(&self) -> AppResult<IndexStats> {
        self.index.stats()
    }

    /// Clear the live index.
    pub fn reset(&self) -> AppResult<()> {
        self.index.reset()
    }

    async fn embed_chunks(&self, chunks: Vec<ChunkRecord>) -> AppResult<Vec<EmbeddedChunk>> {
        let mut embedded = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            for (chunk, vector) in batch.iter().cloned().zip(vectors) {
                embedded.push((chunk, vector));
            }
        }

        Ok(embedded)
    }
}

fn round2(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
