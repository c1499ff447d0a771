//! Query-time retrieval: embed the query with the index's own model, search,
//! and join hits back to their metadata rows.

use crate::error::RetrieveError;
use crate::models::RetrievedChunk;
use providers::ProviderRegistry;
use std::path::PathBuf;
use storage::IndexSnapshot;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct Retriever {
    index_dir: PathBuf,
    registry: ProviderRegistry,
}

impl Retriever {
    pub fn new(index_dir: impl Into<PathBuf>, registry: ProviderRegistry) -> Self {
        Self {
            index_dir: index_dir.into(),
            registry,
        }
    }

    /// Top `top_k` chunks for `query`, best first.
    ///
    /// An empty result means "no evidence": `top_k == 0`, no index on disk,
    /// a truncated `index.bin`, or an index whose metadata holds no usable
    /// rows. The pair is re-read
    /// on every call so a rebuild is picked up without restarting.
    pub async fn retrieve_chunks(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrieveError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let snapshot = match IndexSnapshot::open(&self.index_dir)? {
            Some(s) => s,
            None => {
                debug!(dir = %self.index_dir.display(), "no index pair on disk");
                return Ok(Vec::new());
            }
        };
        search_snapshot(&snapshot, &self.registry, query, top_k).await
    }

    /// Retrieval results rendered as `[title — source] (score=…) text`.
    pub async fn retrieve_snippets(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, RetrieveError> {
        let chunks = self.retrieve_chunks(query, limit).await?;
        Ok(chunks.iter().map(RetrievedChunk::snippet).collect())
    }
}

/// Searches an already-loaded snapshot. Safe to call from many readers at
/// once; the snapshot is never mutated.
pub async fn search_snapshot(
    snapshot: &IndexSnapshot,
    registry: &ProviderRegistry,
    query: &str,
    top_k: usize,
) -> Result<Vec<RetrievedChunk>, RetrieveError> {
    let metadata = snapshot.metadata();
    let model_name = match metadata.model_name() {
        Some(m) if top_k > 0 => m,
        _ => return Ok(Vec::new()),
    };

    let provider = registry.for_model(model_name).ok_or_else(|| {
        warn!(model = model_name, "index was built with an unregistered model");
        RetrieveError::ModelUnavailable(model_name.to_string())
    })?;
    let resp = provider.embed(&[query.to_string()]).await?;
    let vector = match resp.vectors.into_iter().next() {
        Some(v) if !v.is_empty() => v,
        _ => return Err(RetrieveError::EmptyQueryEmbedding),
    };

    let hits = snapshot.index().search(&vector, top_k)?;
    let candidates = hits.len();
    let results: Vec<RetrievedChunk> = hits
        .into_iter()
        .filter_map(|hit| {
            metadata
                .get(hit.row)
                .map(|record| RetrievedChunk::from_metadata(record, hit.score))
        })
        .collect();
    if results.len() < candidates {
        debug!(
            dropped = candidates - results.len(),
            "dropped hits without a metadata row"
        );
    }
    Ok(results)
}
