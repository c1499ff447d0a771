use anyhow::{Context, Result};
use retrieval_core::config::AppConfig;
use retrieval_core::pipeline;
use retrieval_core::RetrievedChunk;

pub fn run_ingest(cfg: &AppConfig, json: bool) -> Result<String> {
    let summary = pipeline::run_ingest(cfg)
        .with_context(|| format!("ingest from {}", cfg.paths.raw_dir))?;
    if json {
        Ok(serde_json::to_string_pretty(&serde_json::json!({
            "status": "ok",
            "processed": summary.processed,
            "skipped": summary.skipped,
            "output": cfg.paths.knowledge_base,
        }))?)
    } else {
        Ok(format!(
            "ingest: processed {}, skipped {} -> {}",
            summary.processed, summary.skipped, cfg.paths.knowledge_base
        ))
    }
}

pub async fn run_build(cfg: &AppConfig, json: bool) -> Result<String> {
    let summary = pipeline::run_build(cfg)
        .await
        .with_context(|| format!("build index from {}", cfg.paths.knowledge_base))?;
    if json {
        Ok(serde_json::to_string_pretty(&serde_json::json!({
            "status": "ok",
            "index_dir": summary.index_dir,
            "build_id": summary.build_id.to_hex(),
            "model_name": summary.model_name,
            "documents": summary.documents,
            "chunks": summary.chunks,
            "dimension": summary.dimension,
        }))?)
    } else {
        Ok(format!(
            "build: {} chunks from {} documents ({}, dim {}) -> {} [{}]",
            summary.chunks,
            summary.documents,
            summary.model_name,
            summary.dimension,
            summary.index_dir.display(),
            summary.build_id
        ))
    }
}

pub async fn run_query(
    cfg: &AppConfig,
    query: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<String> {
    let top_k = top_k.unwrap_or(cfg.retrieval.top_k);
    let results = pipeline::retriever(cfg)
        .retrieve_chunks(query, top_k)
        .await
        .with_context(|| format!("query index at {}", cfg.paths.index_dir))?;
    render_results(&results, json)
}

pub fn render_results(results: &[RetrievedChunk], json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(results)?);
    }
    Ok(results
        .iter()
        .map(RetrievedChunk::snippet)
        .collect::<Vec<_>>()
        .join("\n"))
}
