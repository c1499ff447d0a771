use crate::config::AppConfig;
use crate::error::BuildError;
use crate::indexer::{self, BuildSummary};
use crate::ingest::{self, IngestSummary};
use crate::search::Retriever;
use providers::hashing::HashingProvider;
use providers::openai::{OpenAiConfig, OpenAiProvider};
use providers::ProviderRegistry;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub fn run_ingest(config: &AppConfig) -> Result<IngestSummary, BuildError> {
    info!("Starting ingest phase...");
    ingest::ingest_documents(
        Path::new(&config.paths.raw_dir),
        Path::new(&config.paths.knowledge_base),
        &config.paths.exclude,
    )
}

pub async fn run_build(config: &AppConfig) -> Result<BuildSummary, BuildError> {
    let registry = build_registry(config);
    let provider = registry.embedding(Some(config.embeddings.provider.as_str()))?;
    if provider.model_name() != config.embeddings.model {
        return Err(BuildError::Config(format!(
            "provider {} serves model {}, but embeddings.model is {}",
            config.embeddings.provider,
            provider.model_name(),
            config.embeddings.model
        )));
    }

    info!("Starting build phase...");
    let summary = indexer::build_index(
        Path::new(&config.paths.knowledge_base),
        Path::new(&config.paths.index_dir),
        &config.chunking,
        config.embeddings.batch_size,
        provider.as_ref(),
    )
    .await?;
    info!(
        "Build complete. Indexed {} chunks from {} documents.",
        summary.chunks, summary.documents
    );
    Ok(summary)
}

pub fn retriever(config: &AppConfig) -> Retriever {
    Retriever::new(&config.paths.index_dir, build_registry(config))
}

pub fn build_registry(config: &AppConfig) -> ProviderRegistry {
    let mut reg = ProviderRegistry::new().with_embedding(
        "hashing",
        Arc::new(HashingProvider::new(config.embeddings.dimension)),
    );

    if let (Some(key), Some(base)) = (
        std::env::var_os("OPENAI_API_KEY"),
        std::env::var_os("OPENAI_BASE_URL"),
    ) {
        let provider = OpenAiProvider::new(OpenAiConfig {
            api_key: key.to_string_lossy().into_owned(),
            base_url: base.to_string_lossy().into_owned(),
            embedding_model: config.embeddings.model.clone(),
        });
        reg = reg.with_embedding("openai", Arc::new(provider));
    }

    reg.set_preferred_embedding(&config.embeddings.provider)
}
