use providers::ProviderError;
use std::path::PathBuf;
use storage::StorageError;
use thiserror::Error;

/// Failures that stop a build. No artifacts are replaced when one is returned.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("knowledge base file not found at {0}")]
    MissingSource(PathBuf),
    #[error("no text chunks produced from {0}")]
    NoChunks(String),
    #[error("embedding provider returned no vectors")]
    EmptyEmbeddings,
    #[error("embedding batch invalid: {0}")]
    Embedding(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Retrieval faults that are not plain absence of evidence. Missing
/// artifacts, malformed metadata lines and unmatched rows never surface here.
#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("no embedding provider registered for model {0}")]
    ModelUnavailable(String),
    #[error("embedding provider returned no vector for the query")]
    EmptyQueryEmbedding,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
