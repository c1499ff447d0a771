use crate::error::BuildError;
use providers::EmbeddingProvider;
use tracing::debug;

/// Embeds `texts` in consecutive batches of `batch_size`.
///
/// Batches are awaited one after another and concatenated in input order, so
/// row `i` of the result always belongs to `texts[i]`.
pub async fn encode_batched(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, BuildError> {
    if batch_size == 0 {
        return Err(BuildError::Config("batch_size must be positive".into()));
    }
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    for (n, batch) in texts.chunks(batch_size).enumerate() {
        let resp = provider.embed(batch).await?;
        if resp.vectors.len() != batch.len() {
            return Err(BuildError::Embedding(format!(
                "batch {} returned {} vectors for {} texts",
                n,
                resp.vectors.len(),
                batch.len()
            )));
        }
        debug!(batch = n, size = batch.len(), "embedded batch");
        vectors.extend(resp.vectors);
    }

    let dimension = match vectors.first() {
        Some(v) if !v.is_empty() => v.len(),
        _ => return Err(BuildError::EmptyEmbeddings),
    };
    if let Some((row, v)) = vectors
        .iter()
        .enumerate()
        .find(|(_, v)| v.len() != dimension)
    {
        return Err(BuildError::Embedding(format!(
            "row {} has dimension {}, expected {}",
            row,
            v.len(),
            dimension
        )));
    }
    Ok(vectors)
}
