//! Embedding provider abstractions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod hashing;
pub mod openai;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub vectors: Vec<Vec<f32>>,
}

/// Maps texts to unit-length dense vectors.
///
/// Implementations must be deterministic for a fixed model and input, and
/// return exactly one row per input text.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Name recorded next to every indexed chunk.
    fn model_name(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError>;
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    embeddings: HashMap<String, Arc<dyn EmbeddingProvider>>,
    pub preferred_embedding: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedding(mut self, name: &str, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings.insert(name.to_string(), provider);
        self
    }

    pub fn set_preferred_embedding(mut self, name: &str) -> Self {
        self.preferred_embedding = Some(name.to_string());
        self
    }

    pub fn embedding(
        &self,
        name: Option<&str>,
    ) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred_embedding.clone())
            .ok_or_else(|| {
                ProviderError::UnknownProvider("no embedding provider configured".into())
            })?;
        self.embeddings
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(key))
    }

    /// Finds the provider that serves `model_name`.
    ///
    /// The preferred provider wins when several registered providers report
    /// the same model; otherwise the lookup order is by provider name.
    pub fn for_model(&self, model_name: &str) -> Option<Arc<dyn EmbeddingProvider>> {
        if let Some(preferred) = self
            .preferred_embedding
            .as_deref()
            .and_then(|name| self.embeddings.get(name))
        {
            if preferred.model_name() == model_name {
                return Some(preferred.clone());
            }
        }
        let mut names: Vec<&String> = self.embeddings.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| self.embeddings.get(name))
            .find(|p| p.model_name() == model_name)
            .cloned()
    }
}

/// Scales `vector` to unit length in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}
