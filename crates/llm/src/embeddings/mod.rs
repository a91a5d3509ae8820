//! Embedding provider trait and implementations.

pub mod ollama;
pub mod trigram;

use coverqa_core::{AppError, AppResult};

pub use ollama::OllamaEmbedder;
pub use trigram::TrigramEmbedder;

/// Trait for embedding backends.
///
/// A provider is pinned to one model and one output dimension; re-embedding
/// a corpus with a different model requires a full index rebuild, never a
/// mix of vector versions.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "ollama", "trigram")
    fn provider_name(&self) -> &str;

    /// Get the pinned model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Llm("No embedding returned".to_string()))
    }
}
