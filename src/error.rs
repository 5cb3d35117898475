//! Error types for the RAG evaluation pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, RagJudgeError>;

/// Errors that can occur in the pipeline.
#[derive(Error, Debug)]
pub enum RagJudgeError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The document directory does not exist or is not a directory.
    #[error("Document path '{0}' does not exist or is not a directory")]
    InvalidCorpusPath(PathBuf),

    /// An index artifact is missing.
    #[error("Index artifact not found at '{0}'")]
    IndexNotFound(PathBuf),

    /// The persisted index artifacts disagree with each other.
    #[error("Index is inconsistent: {0}")]
    IndexCorrupt(String),

    /// The evaluation dataset could not be interpreted.
    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    /// Configuration file or value error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Chat/embedding API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),
}

impl RagJudgeError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for RagJudgeError {
    fn from(err: reqwest::Error) -> Self {
        RagJudgeError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for RagJudgeError {
    fn from(err: serde_json::Error) -> Self {
        RagJudgeError::Serialization(err.to_string())
    }
}
