//! Storage layer: the vector index and metadata artifacts.
//!
//! Both artifacts are written together by one build and verified together on
//! load. Row `i` of the vector index always describes metadata line `i`.

pub mod artifacts;
pub mod metadata;
pub mod vector_index;

use thiserror::Error;

pub use artifacts::{write_pair, BuildId, IndexPaths, IndexSnapshot};
pub use metadata::{ChunkMetadata, MetadataStore};
pub use vector_index::{FlatIpIndex, Hit};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot build an index from zero vectors")]
    EmptyIndex,
    #[error("vectors must have at least one dimension")]
    ZeroDimension,
    #[error("dimension mismatch at row {row}: expected {expected}, got {actual}")]
    InconsistentRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("query dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("corrupt index file: {0}")]
    CorruptIndex(String),
    #[error("metadata line {line} carries position {position}")]
    PositionMismatch { line: usize, position: usize },
    #[error("metadata row count {metadata} does not match index row count {index}")]
    RowCountMismatch { index: usize, metadata: usize },
    #[error("build id mismatch: index {index}, metadata {metadata}")]
    BuildMismatch { index: String, metadata: String },
    #[error("metadata mixes embedding models: {first} and {other}")]
    MixedModels { first: String, other: String },
}

pub type Result<T> = std::result::Result<T, StorageError>;
