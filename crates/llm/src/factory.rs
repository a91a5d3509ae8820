//! Factory functions constructing backend clients from configuration.

use crate::client::LlmClient;
use crate::embeddings::{EmbeddingProvider, OllamaEmbedder, TrigramEmbedder};
use crate::providers::OllamaClient;
use coverqa_core::config::LlmSettings;
use coverqa_core::{AppError, AppResult};
use std::sync::Arc;

/// Create a text-generation client for the configured provider.
pub fn create_client(settings: &LlmSettings) -> AppResult<Arc<dyn LlmClient>> {
    match settings.provider.as_str() {
        "ollama" => {
            let client = OllamaClient::new(
                settings.endpoint.clone(),
                settings.timeout_secs,
                settings.max_concurrent_requests,
            )?;
            Ok(Arc::new(client))
        }
        other => Err(AppError::Config(format!(
            "Unknown generation provider: '{}'. Supported: ollama",
            other
        ))),
    }
}

/// Create an embedding provider for the configured backend.
pub fn create_embedder(settings: &LlmSettings) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.embedding_provider.as_str() {
        "ollama" => {
            let embedder = OllamaEmbedder::new(
                settings.endpoint.clone(),
                settings.embedding_model.clone(),
                settings.embedding_dim,
                settings.timeout_secs,
            )?;
            Ok(Arc::new(embedder))
        }
        // Deterministic offline embedder, mainly for tests and demos
        "trigram" | "mock" => Ok(Arc::new(TrigramEmbedder::new(settings.embedding_dim))),
        other => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported: ollama, trigram",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_client() {
        let settings = LlmSettings::default();
        let client = create_client(&settings).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_create_trigram_embedder() {
        let settings = LlmSettings {
            embedding_provider: "trigram".to_string(),
            embedding_dim: 256,
            ..Default::default()
        };
        let embedder = create_embedder(&settings).unwrap();
        assert_eq!(embedder.provider_name(), "trigram");
        assert_eq!(embedder.dimensions(), 256);
    }

    #[test]
    fn test_unknown_provider() {
        let settings = LlmSettings {
            provider: "unknown".to_string(),
            ..Default::default()
        };
        assert!(create_client(&settings).is_err());
    }
}
