//! Whole-index builds: documents → chunks → vectors → persisted pair.

use crate::chunker::chunk_documents;
use crate::config::ChunkingConfig;
use crate::embeddings::encode_batched;
use crate::error::BuildError;
use crate::ingest::load_kb;
use crate::models::DocumentRecord;
use providers::EmbeddingProvider;
use std::path::{Path, PathBuf};
use storage::{write_pair, BuildId, ChunkMetadata, FlatIpIndex};
use tracing::info;

#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub index_dir: PathBuf,
    pub build_id: BuildId,
    pub model_name: String,
    pub documents: usize,
    pub chunks: usize,
    pub dimension: usize,
}

/// Builds from a JSONL knowledge base file. See [`build_from_documents`].
pub async fn build_index(
    kb_path: &Path,
    index_dir: &Path,
    chunking: &ChunkingConfig,
    batch_size: usize,
    provider: &dyn EmbeddingProvider,
) -> Result<BuildSummary, BuildError> {
    chunking.validate()?;
    let documents = load_kb(kb_path)?;
    info!(documents = documents.len(), kb = %kb_path.display(), "loaded knowledge base");
    build_from_documents(
        &documents,
        &kb_path.display().to_string(),
        index_dir,
        chunking,
        batch_size,
        provider,
    )
    .await
}

/// Chunks, embeds and persists `documents`, replacing any pair in
/// `index_dir`. Nothing on disk changes unless every step succeeds.
pub async fn build_from_documents(
    documents: &[DocumentRecord],
    source_label: &str,
    index_dir: &Path,
    chunking: &ChunkingConfig,
    batch_size: usize,
    provider: &dyn EmbeddingProvider,
) -> Result<BuildSummary, BuildError> {
    let chunks = chunk_documents(documents, chunking)?;
    if chunks.is_empty() {
        return Err(BuildError::NoChunks(source_label.to_string()));
    }
    info!(chunks = chunks.len(), "chunking complete");

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = encode_batched(provider, &texts, batch_size).await?;
    let index = FlatIpIndex::build(&vectors)?;
    info!(
        rows = index.len(),
        dimension = index.dimension(),
        model = provider.model_name(),
        "embedding complete"
    );

    let model_name = provider.model_name().to_string();
    let records: Vec<ChunkMetadata> = chunks
        .into_iter()
        .enumerate()
        .map(|(position, chunk)| chunk.into_metadata(position, &model_name))
        .collect();
    let build_id = write_pair(index_dir, &index, records)?;

    Ok(BuildSummary {
        index_dir: index_dir.to_path_buf(),
        build_id,
        model_name,
        documents: documents.len(),
        chunks: index.len(),
        dimension: index.dimension(),
    })
}
