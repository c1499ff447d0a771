//! Core library: chunking, ingestion, index builds, and retrieval.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod indexer;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod search;

pub use error::{BuildError, RetrieveError};
pub use models::{DocumentRecord, IndexedChunk, RetrievedChunk};
pub use search::Retriever;
