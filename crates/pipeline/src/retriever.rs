//! Fan-out retrieval and result fusion.
//!
//! Every expanded query is embedded and searched against the index
//! concurrently, then the per-query result lists are fused into one
//! ranked list. Fusion keeps the best similarity a chunk achieved across
//! all queries; deduplication is by chunk identity, never text similarity.

use crate::index::SemanticIndex;
use crate::types::{ExpandedQuery, ScoredChunk};
use coverqa_core::AppResult;
use coverqa_llm::EmbeddingProvider;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;

/// Multi-query retriever over the semantic index.
pub struct Retriever {
    index: Arc<SemanticIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    per_query_k: usize,
    min_similarity: f32,
}

impl Retriever {
    pub fn new(
        index: Arc<SemanticIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        per_query_k: usize,
        min_similarity: f32,
    ) -> Self {
        Self {
            index,
            embedder,
            per_query_k,
            min_similarity,
        }
    }

    /// Retrieve the fused top-k chunks for an expanded query set.
    ///
    /// An empty result is a legitimate outcome (nothing relevant in the
    /// corpus), not an error. A failing sub-query is logged and skipped
    /// without affecting its siblings.
    pub async fn retrieve(
        &self,
        expanded: &ExpandedQuery,
        final_k: usize,
    ) -> AppResult<Vec<ScoredChunk>> {
        let vectors = self.embedder.embed_batch(&expanded.queries).await?;

        // One search task per query; index reads are side-effect-free, so
        // they may run in parallel and join before fusion.
        let searches = expanded
            .queries
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(query, vector)| {
                let index = Arc::clone(&self.index);
                let k = self.per_query_k;
                let floor = self.min_similarity;
                async move {
                    let result = tokio::task::spawn_blocking(move || {
                        index.search(&vector, k, floor)
                    })
                    .await;
                    (query, result)
                }
            });

        let mut fused: HashMap<String, ScoredChunk> = HashMap::new();
        let mut total_hits = 0;

        for (query, joined) in join_all(searches).await {
            let hits = match joined {
                Ok(Ok(hits)) => hits,
                Ok(Err(e)) => {
                    tracing::warn!("Sub-query '{}' failed: {} (skipping)", query, e);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Sub-query '{}' panicked: {} (skipping)", query, e);
                    continue;
                }
            };

            total_hits += hits.len();
            for (chunk, score) in hits {
                match fused.get_mut(&chunk.chunk_id) {
                    Some(existing) => {
                        if score > existing.score {
                            existing.score = score;
                        }
                        existing.matched_queries.push(query.clone());
                    }
                    None => {
                        fused.insert(
                            chunk.chunk_id.clone(),
                            ScoredChunk {
                                chunk,
                                score,
                                matched_queries: vec![query.clone()],
                            },
                        );
                    }
                }
            }
        }

        let mut results: Vec<ScoredChunk> = fused.into_values().collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
                .then_with(|| a.chunk.position.cmp(&b.chunk.position))
        });
        results.truncate(final_k);

        tracing::info!(
            "Retrieved {} unique chunks from {} hits across {} queries",
            results.len(),
            total_hits,
            expanded.queries.len()
        );

        Ok(results)
    }
}
