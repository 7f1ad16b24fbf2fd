//! Typed errors for the analysis pipeline and its feedback sources.

use thiserror::Error;

/// Failures fetching raw feedback.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Source reference does not exist (bad spreadsheet id, missing file)
    #[error("feedback source not found: {0}")]
    NotFound(String),

    /// Source exists but cannot be read
    #[error("access denied to feedback source: {0}")]
    Access(String),

    #[error("feedback source request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not decode feedback source: {0}")]
    Decode(String),
}

/// Request-fatal failures. Everything else degrades to a fallback.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Embedding model unavailable or returned unusable vectors
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A blocking worker panicked or was cancelled
    #[error("analysis worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;
