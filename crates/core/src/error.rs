//! Error types for the CoverQA pipeline.
//!
//! This module defines a unified error enum that covers all error categories
//! in the application: configuration, I/O, document parsing, the semantic
//! index, and LLM backends.

use thiserror::Error;

/// Unified error type for the CoverQA pipeline.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
/// We never panic — errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document parse errors, scoped to a single document.
    /// These never abort a corpus-wide batch.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Semantic index errors (storage, rebuild, corrupt data)
    #[error("Index error: {0}")]
    Index(String),

    /// LLM backend errors (generation or embedding)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Prompt rendering errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
