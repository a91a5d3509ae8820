//! LLM backend abstractions for the CoverQA pipeline.
//!
//! Two backend interfaces are consumed by the pipeline (and nothing else):
//! - [`LlmClient`]: structured text generation with JSON mode and timeouts
//! - [`EmbeddingProvider`]: pinned-model, fixed-dimension text embeddings
//!
//! Production implementations talk to a local Ollama instance; the
//! scripted client and trigram embedder provide deterministic offline
//! behavior for tests.

pub mod client;
pub mod embeddings;
pub mod factory;
pub mod providers;

pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use embeddings::{EmbeddingProvider, OllamaEmbedder, TrigramEmbedder};
pub use factory::{create_client, create_embedder};
