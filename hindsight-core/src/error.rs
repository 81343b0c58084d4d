//! Error types for hindsight-core

use thiserror::Error;

/// Main error type for the hindsight-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error for transcript files
    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The analysis collaborator failed to answer
    #[error("LLM error: {0}")]
    Llm(String),

    /// The collaborator answered, but no usable JSON could be recovered
    #[error("analysis format error: {0}")]
    AnalysisFormat(String),
}

/// Result type alias for hindsight-core
pub type Result<T> = std::result::Result<T, Error>;
