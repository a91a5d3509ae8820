//! Configuration management for the CoverQA pipeline.
//!
//! Configuration is layered: built-in defaults, then an optional YAML file
//! (`coverqa.yaml`), then `COVERQA_*` environment variables. The result is
//! validated once at load time; components receive the already-validated
//! config by reference.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the persisted semantic index database
    pub index_path: PathBuf,

    /// Optional config file path this config was loaded from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,

    /// Log level override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,

    /// LLM backend settings
    #[serde(default)]
    pub llm: LlmSettings,

    /// Chunking parameters
    #[serde(default)]
    pub chunking: ChunkingSettings,

    /// Query expansion parameters
    #[serde(default)]
    pub expansion: ExpansionSettings,

    /// Retrieval parameters
    #[serde(default)]
    pub retrieval: RetrievalSettings,

    /// Answer synthesis parameters
    #[serde(default)]
    pub synthesis: SynthesisSettings,
}

/// Settings for the generation and embedding backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Generation backend ("ollama", or "scripted" for offline runs)
    pub provider: String,

    /// Embedding backend ("ollama", or "trigram" for offline runs)
    pub embedding_provider: String,

    /// Ollama endpoint base URL
    pub endpoint: String,

    /// Generation model identifier
    pub model: String,

    /// Embedding model identifier (pinned; changing it requires a rebuild)
    pub embedding_model: String,

    /// Embedding vector dimension
    pub embedding_dim: usize,

    /// Per-request timeout for backend calls, in seconds
    pub timeout_secs: u64,

    /// Maximum concurrent in-flight backend requests
    pub max_concurrent_requests: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            embedding_provider: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dim: 768,
            timeout_secs: 120,
            max_concurrent_requests: 2,
        }
    }
}

/// Chunking parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingSettings {
    /// Target chunk size in estimated tokens
    pub target_tokens: usize,

    /// Overlap between consecutive chunks in estimated tokens
    pub overlap_tokens: usize,

    /// Hard upper bound on chunk size (a single oversized sentence may
    /// still exceed the target but is capped for reporting purposes)
    pub max_tokens: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            target_tokens: 800,
            overlap_tokens: 120,
            max_tokens: 1000,
        }
    }
}

/// Query expansion parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionSettings {
    /// Number of paraphrases requested from the backend
    pub variants: usize,

    /// Length bound per paraphrase; longer output is treated as unusable
    pub max_variant_chars: usize,
}

impl Default for ExpansionSettings {
    fn default() -> Self {
        Self {
            variants: 3,
            max_variant_chars: 300,
        }
    }
}

/// Retrieval parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    /// Chunks retrieved per expanded query before fusion
    pub per_query_k: usize,

    /// Minimum cosine similarity for a chunk to be considered relevant
    pub min_similarity: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            per_query_k: 8,
            min_similarity: 0.20,
        }
    }
}

/// Answer synthesis parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisSettings {
    /// Maximum characters of chunk context sent to the backend
    pub max_context_chars: usize,

    /// Schema-repair retries before degrading to Unknown
    pub max_retries: usize,

    /// Maximum caveats returned per answer
    pub max_caveats: usize,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            max_context_chars: 12_000,
            max_retries: 2,
            max_caveats: 6,
        }
    }
}

/// Partial configuration file structure (all sections optional).
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    index_path: Option<PathBuf>,
    llm: Option<LlmSettings>,
    chunking: Option<ChunkingSettings>,
    expansion: Option<ExpansionSettings>,
    retrieval: Option<RetrievalSettings>,
    synthesis: Option<SynthesisSettings>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("data/index.db"),
            config_file: None,
            log_level: None,
            no_color: false,
            llm: LlmSettings::default(),
            chunking: ChunkingSettings::default(),
            expansion: ExpansionSettings::default(),
            retrieval: RetrievalSettings::default(),
            synthesis: SynthesisSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, YAML file, and environment.
    ///
    /// Environment variables:
    /// - `COVERQA_CONFIG`: path to config file (default: ./coverqa.yaml)
    /// - `COVERQA_INDEX`: override index database path
    /// - `COVERQA_ENDPOINT`: Ollama endpoint base URL
    /// - `COVERQA_MODEL`: generation model identifier
    /// - `COVERQA_EMBEDDING_MODEL`: embedding model identifier
    /// - `RUST_LOG`: log level
    /// - `NO_COLOR`: disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        let config_path = std::env::var("COVERQA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("coverqa.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
            config.config_file = Some(config_path);
        }

        // Environment variables override the YAML file
        if let Ok(index) = std::env::var("COVERQA_INDEX") {
            config.index_path = PathBuf::from(index);
        }
        if let Ok(endpoint) = std::env::var("COVERQA_ENDPOINT") {
            config.llm.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("COVERQA_MODEL") {
            config.llm.model = model;
        }
        if let Ok(embedding_model) = std::env::var("COVERQA_EMBEDDING_MODEL") {
            config.llm.embedding_model = embedding_model;
        }

        config.log_level = std::env::var("RUST_LOG").ok();
        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        config.validate()?;
        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &PathBuf) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(index_path) = config_file.index_path {
            result.index_path = index_path;
        }
        if let Some(llm) = config_file.llm {
            result.llm = llm;
        }
        if let Some(chunking) = config_file.chunking {
            result.chunking = chunking;
        }
        if let Some(expansion) = config_file.expansion {
            result.expansion = expansion;
        }
        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(synthesis) = config_file.synthesis {
            result.synthesis = synthesis;
        }
        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        Ok(result)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunking.target_tokens == 0 {
            return Err(AppError::Config(
                "chunking.target_tokens must be positive".to_string(),
            ));
        }
        if self.chunking.overlap_tokens >= self.chunking.target_tokens {
            return Err(AppError::Config(format!(
                "chunking.overlap_tokens ({}) must be smaller than target_tokens ({})",
                self.chunking.overlap_tokens, self.chunking.target_tokens
            )));
        }
        if self.llm.embedding_dim == 0 {
            return Err(AppError::Config(
                "llm.embedding_dim must be positive".to_string(),
            ));
        }
        if self.llm.max_concurrent_requests == 0 {
            return Err(AppError::Config(
                "llm.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.expansion.variants == 0 {
            return Err(AppError::Config(
                "expansion.variants must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_similarity) {
            return Err(AppError::Config(format!(
                "retrieval.min_similarity must be in [0,1], got {}",
                self.retrieval.min_similarity
            )));
        }
        Ok(())
    }
}
